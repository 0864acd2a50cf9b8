//! Profile role.

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown role string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid role: {0}")]
pub struct RoleError(String);

/// Role stored on a profile row.
///
/// The role only decides what the portal *shows*. Whether a write is actually
/// permitted is decided by the backend's row-level policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Portal administrator: can upload, publish and import.
    Admin,
    /// Franchise owner: read access to shared content.
    #[default]
    Franchisee,
}

impl Role {
    /// Returns true for [`Role::Admin`].
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Human-readable label for display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Admin => "Administrator",
            Self::Franchisee => "Franchisee",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Franchisee => write!(f, "franchisee"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "franchisee" => Ok(Self::Franchisee),
            _ => Err(RoleError(s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrips_through_str() {
        for role in [Role::Admin, Role::Franchisee] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_role_rejects_unknown() {
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_deserializes_lowercase() {
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert!(role.is_admin());
        let role: Role = serde_json::from_str("\"franchisee\"").unwrap();
        assert!(!role.is_admin());
    }
}
