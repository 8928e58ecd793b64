//! Authenticated identity input for connection attempts.
//!
//! Credential checks are delegated to an external identity collaborator;
//! the gateway only consumes the authenticated [`UserProfile`] it yields.
//! [`IdentityProvider`] is the seam to that collaborator, and
//! [`StaticIdentityProvider`] is the in-process implementation used by the
//! binary (seeded from configuration) and by tests.

use std::collections::HashMap;

use crate::domain::UserId;

/// Authenticated user identity attached to a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Stable user identifier.
    pub id: UserId,
    /// Display name used in broadcast payloads and system messages.
    pub username: String,
    /// Presence flag reported by the identity collaborator.
    pub is_online: bool,
}

impl UserProfile {
    /// Creates a profile for an online user.
    #[must_use]
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_online: true,
        }
    }
}

/// Resolves connection tokens to authenticated identities.
///
/// Implementations never see credentials; the token is an opaque proof
/// already minted by the external auth system.
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// Returns the identity the token was issued for, or `None` when the
    /// token is unknown or expired.
    fn resolve(&self, token: &str) -> Option<UserProfile>;
}

/// Fixed token-to-identity mapping.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    users: HashMap<String, UserProfile>,
}

impl StaticIdentityProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for the given profile, replacing any previous
    /// binding of the same token.
    pub fn insert(&mut self, token: impl Into<String>, profile: UserProfile) {
        self.users.insert(token.into(), profile);
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with_user(mut self, token: impl Into<String>, profile: UserProfile) -> Self {
        self.insert(token, profile);
        self
    }

    /// Parses a `token:user_uuid:username` comma-separated seed string,
    /// skipping malformed entries.
    #[must_use]
    pub fn from_seed(seed: &str) -> Self {
        let mut provider = Self::new();
        for entry in seed.split(',').filter(|e| !e.trim().is_empty()) {
            let mut parts = entry.trim().splitn(3, ':');
            let (Some(token), Some(id), Some(username)) =
                (parts.next(), parts.next(), parts.next())
            else {
                tracing::warn!(entry, "skipping malformed identity seed entry");
                continue;
            };
            let Ok(uuid) = id.parse::<uuid::Uuid>() else {
                tracing::warn!(entry, "skipping identity seed entry with bad uuid");
                continue;
            };
            provider.insert(token, UserProfile::new(UserId::from_uuid(uuid), username));
        }
        provider
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn resolve(&self, token: &str) -> Option<UserProfile> {
        self.users.get(token).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn resolve_known_token() {
        let id = UserId::new();
        let provider =
            StaticIdentityProvider::new().with_user("tok-a", UserProfile::new(id, "alice"));

        let profile = provider.resolve("tok-a");
        let Some(profile) = profile else {
            panic!("expected identity for known token");
        };
        assert_eq!(profile.id, id);
        assert_eq!(profile.username, "alice");
        assert!(profile.is_online);
    }

    #[test]
    fn resolve_unknown_token_is_none() {
        let provider = StaticIdentityProvider::new();
        assert!(provider.resolve("missing").is_none());
    }

    #[test]
    fn from_seed_parses_entries_and_skips_malformed() {
        let uuid = uuid::Uuid::new_v4();
        let seed = format!("tok-a:{uuid}:alice, broken-entry ,");
        let provider = StaticIdentityProvider::from_seed(&seed);

        assert!(provider.resolve("tok-a").is_some());
        assert!(provider.resolve("broken-entry").is_none());
    }
}
