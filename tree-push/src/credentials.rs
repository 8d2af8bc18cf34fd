//! Storage credentials.
//!
//! Credentials are issued per user by an external service. The engine only
//! needs them to be valid for the duration of one upload, so a caching
//! provider refreshes them shortly before they expire.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use tree_types::{unix_now, UserId};
use zeroize::Zeroizing;

/// Credential errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The provider has no credentials for this user.
    #[error("no credentials for user {0}")]
    UnknownUser(String),

    /// The issuing service could not be reached or refused.
    #[error("credentials unavailable: {0}")]
    Unavailable(String),
}

/// Temporary object-storage credentials.
#[derive(Clone)]
pub struct StorageCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: Zeroizing<String>,
    /// Session token.
    pub session_token: Zeroizing<String>,
    /// Unix seconds after which the credentials are invalid.
    pub expiration: u64,
}

impl StorageCredentials {
    /// Whether the credentials expire within `margin_secs` of `now`.
    pub fn expires_within(&self, margin_secs: u64, now: u64) -> bool {
        self.expiration <= now.saturating_add(margin_secs)
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Source of storage credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Credentials for `user`'s bucket.
    async fn credentials_for(&self, user: &UserId) -> Result<StorageCredentials, CredentialError>;
}

/// Caches credentials per user until they are about to expire.
pub struct CachingCredentialProvider<P: CredentialProvider> {
    inner: P,
    margin_secs: u64,
    cache: DashMap<UserId, StorageCredentials>,
}

impl<P: CredentialProvider> CachingCredentialProvider<P> {
    /// Wrap `inner`, refreshing `margin_secs` before expiry.
    pub fn new(inner: P, margin_secs: u64) -> Self {
        Self {
            inner,
            margin_secs,
            cache: DashMap::new(),
        }
    }

    /// Drop the cached credentials of `user`.
    pub fn invalidate(&self, user: &UserId) {
        self.cache.remove(user);
    }
}

#[async_trait]
impl<P: CredentialProvider> CredentialProvider for CachingCredentialProvider<P> {
    async fn credentials_for(&self, user: &UserId) -> Result<StorageCredentials, CredentialError> {
        if let Some(cached) = self.cache.get(user) {
            if !cached.expires_within(self.margin_secs, unix_now()) {
                return Ok(cached.value().clone());
            }
        }
        debug!(user_id = %user, "refreshing storage credentials");
        let fresh = self.inner.credentials_for(user).await?;
        self.cache.insert(user.clone(), fresh.clone());
        Ok(fresh)
    }
}

/// Fixed credentials per user, for tests and offline simulation.
///
/// Counts how often it was asked.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialProvider {
    credentials: Arc<HashMap<UserId, StorageCredentials>>,
    requests: Arc<AtomicUsize>,
}

impl StaticCredentialProvider {
    /// Provider knowing the given users.
    pub fn new(credentials: impl IntoIterator<Item = (UserId, StorageCredentials)>) -> Self {
        Self {
            credentials: Arc::new(credentials.into_iter().collect()),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Credentials for `user` valid for `ttl_secs` from now.
    pub fn issue(user: &UserId, ttl_secs: u64) -> StorageCredentials {
        StorageCredentials {
            access_key_id: format!("AKIA-{}", user),
            secret_access_key: Zeroizing::new(format!("secret-{}", user)),
            session_token: Zeroizing::new(format!("session-{}", user)),
            expiration: unix_now().saturating_add(ttl_secs),
        }
    }

    /// Number of `credentials_for` calls so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credentials_for(&self, user: &UserId) -> Result<StorageCredentials, CredentialError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.credentials
            .get(user)
            .cloned()
            .ok_or_else(|| CredentialError::UnknownUser(user.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserId {
        UserId::new("alice")
    }

    #[tokio::test]
    async fn static_provider_knows_its_users() {
        let provider =
            StaticCredentialProvider::new([(alice(), StaticCredentialProvider::issue(&alice(), 3600))]);
        let creds = provider.credentials_for(&alice()).await.unwrap();
        assert_eq!(creds.access_key_id, "AKIA-alice");

        let missing = provider.credentials_for(&UserId::new("bob")).await;
        assert!(matches!(missing, Err(CredentialError::UnknownUser(_))));
        assert_eq!(provider.requests(), 2);
    }

    #[tokio::test]
    async fn cache_serves_fresh_credentials() {
        let inner =
            StaticCredentialProvider::new([(alice(), StaticCredentialProvider::issue(&alice(), 3600))]);
        let caching = CachingCredentialProvider::new(inner.clone(), 300);

        caching.credentials_for(&alice()).await.unwrap();
        caching.credentials_for(&alice()).await.unwrap();
        assert_eq!(inner.requests(), 1);

        caching.invalidate(&alice());
        caching.credentials_for(&alice()).await.unwrap();
        assert_eq!(inner.requests(), 2);
    }

    #[tokio::test]
    async fn cache_refreshes_near_expiry() {
        // Valid for one minute, refreshed five minutes ahead: never cached.
        let inner =
            StaticCredentialProvider::new([(alice(), StaticCredentialProvider::issue(&alice(), 60))]);
        let caching = CachingCredentialProvider::new(inner.clone(), 300);

        caching.credentials_for(&alice()).await.unwrap();
        caching.credentials_for(&alice()).await.unwrap();
        assert_eq!(inner.requests(), 2);
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = StaticCredentialProvider::issue(&alice(), 60);
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret-alice"));
        assert!(!debug.contains("session-alice"));
        assert!(debug.contains("AKIA-alice"));
    }
}
