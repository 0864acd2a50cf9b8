//! Identity-change notifications and profile re-resolution.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Profile, load_profile};
use crate::backend::{BackendClient, Identity};

/// A signed-in identity together with the access token it was issued.
#[derive(Clone)]
pub struct SignedIn {
    pub identity: Identity,
    pub access_token: SecretString,
}

impl SignedIn {
    #[must_use]
    pub const fn new(identity: Identity, access_token: SecretString) -> Self {
        Self {
            identity,
            access_token,
        }
    }
}

impl PartialEq for SignedIn {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.access_token.expose_secret() == other.access_token.expose_secret()
    }
}

impl std::fmt::Debug for SignedIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedIn")
            .field("identity", &self.identity)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Broadcasts the current identity whenever it changes.
///
/// Sign-in and token refresh publish `Some(signed_in)`, sign-out and
/// rejected tokens publish `None`. Subscribers only ever see the latest value.
#[derive(Debug, Clone)]
pub struct IdentityEvents {
    sender: Arc<watch::Sender<Option<SignedIn>>>,
}

impl Default for IdentityEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityEvents {
    /// Create a channel with no identity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish a new identity. Subscribers are only woken on change.
    pub fn publish(&self, signed_in: Option<SignedIn>) {
        self.sender.send_if_modified(|current| {
            if *current == signed_in {
                false
            } else {
                *current = signed_in;
                true
            }
        });
    }

    /// Latest published identity.
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.sender.borrow().as_ref().map(|s| s.identity.clone())
    }

    /// Receive future changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<SignedIn>> {
        self.sender.subscribe()
    }
}

/// Keeps a profile in step with identity changes.
///
/// Runs a background task that reloads the profile each time the identity
/// changes, acting with the token that came with the change, and clears it
/// on sign-out. The task stops when the watcher is
/// dropped, so a profile load that finishes afterwards is discarded.
pub struct ProfileWatcher {
    profile: Arc<RwLock<Option<Profile>>>,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl ProfileWatcher {
    /// Start watching `events`, loading profiles through `backend`.
    #[must_use]
    pub fn spawn(events: &IdentityEvents, backend: BackendClient) -> Self {
        let profile = Arc::new(RwLock::new(None));
        let stop = CancellationToken::new();
        let mut changes = events.subscribe();

        let slot = Arc::clone(&profile);
        let token = stop.clone();
        let task = tokio::spawn(async move {
            // Resolve whatever identity is already present before waiting.
            changes.mark_changed();
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let signed_in = changes.borrow_and_update().clone();
                let resolved = match signed_in {
                    None => None,
                    Some(SignedIn { identity, access_token }) => {
                        let client = backend.authed(access_token);
                        let load = load_profile(&client, &identity.id);
                        tokio::select! {
                            biased;
                            () = token.cancelled() => break,
                            loaded = load => match loaded {
                                Ok(profile) => profile,
                                Err(e) => {
                                    tracing::warn!(
                                        error = %e,
                                        identity = %identity.id,
                                        "profile load failed"
                                    );
                                    None
                                }
                            },
                        }
                    }
                };
                *slot.write().await = resolved;
            }
        });

        Self {
            profile,
            stop,
            task,
        }
    }

    /// Most recently resolved profile.
    pub async fn profile(&self) -> Option<Profile> {
        self.profile.read().await.clone()
    }

    /// Whether the background task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ProfileWatcher {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use franchise_portal_core::IdentityId;

    use super::*;

    fn identity(id: &str) -> Identity {
        Identity {
            id: IdentityId::new(id),
            email: None,
        }
    }

    fn signed_in(id: &str, token: &str) -> SignedIn {
        SignedIn::new(identity(id), SecretString::from(token))
    }

    #[tokio::test]
    async fn test_publish_only_notifies_on_change() {
        let events = IdentityEvents::new();
        let mut rx = events.subscribe();

        events.publish(None);
        assert!(!rx.has_changed().unwrap());

        events.publish(Some(signed_in("u-1", "t-1")));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().clone(), Some(signed_in("u-1", "t-1")));

        events.publish(Some(signed_in("u-1", "t-1")));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(events.current(), Some(identity("u-1")));
    }

    #[tokio::test]
    async fn test_refreshed_token_notifies() {
        let events = IdentityEvents::new();
        events.publish(Some(signed_in("u-1", "t-1")));
        let mut rx = events.subscribe();

        events.publish(Some(signed_in("u-1", "t-2")));
        assert!(rx.has_changed().unwrap());
        let latest = rx.borrow_and_update().clone().unwrap();
        assert_eq!(latest.access_token.expose_secret(), "t-2");
    }

    #[test]
    fn test_debug_hides_token() {
        let debug_output = format!("{:?}", signed_in("u-1", "secret-access"));
        assert!(!debug_output.contains("secret-access"));
    }

    #[tokio::test]
    async fn test_sign_out_clears_identity() {
        let events = IdentityEvents::new();
        events.publish(Some(signed_in("u-1", "t-1")));
        events.publish(None);
        assert_eq!(events.current(), None);
    }
}
