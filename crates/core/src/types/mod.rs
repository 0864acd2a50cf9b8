//! Core types for the Franchise Portal.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cell;
pub mod email;
pub mod id;
pub mod role;

pub use cell::{CellValue, DISPLAY_TRUNCATE_AT, truncate_chars};
pub use email::{Email, EmailError};
pub use id::*;
pub use role::{Role, RoleError};
