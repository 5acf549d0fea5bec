use async_trait::async_trait;
use keyring::Entry;
use tracing::debug;

use super::credentials::{CredentialStore, StoreError};

const SERVICE_NAME: &str = "community-app";

/// Credentials kept in the OS keychain, one keychain entry per store key.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Whether a native keychain backs entries on this platform.
    /// Elsewhere `keyring` hands out a mock that forgets every write.
    pub const fn is_supported() -> bool {
        cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows"))
    }

    /// Use a custom keychain service name (e.g. one per backend host)
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    // Keychain calls block, so each one runs on the blocking pool
    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &key)?;
            op(entry)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
        .map_err(StoreError::from)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_entry(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let value = value.to_string();
        self.with_entry(key, move |entry| entry.set_password(&value))
            .await?;
        debug!(key, service = %self.service, "Stored credential in keychain");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.with_entry(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ACCESS_TOKEN_KEY;

    // Needs a reachable OS keychain (kernel keyring on Linux)
    #[tokio::test]
    #[ignore]
    async fn test_keyring_store_round_trip() {
        let store = KeyringStore::with_service("community-app-test");

        store.set(ACCESS_TOKEN_KEY, "abc").await.unwrap();
        assert_eq!(
            store.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(),
            Some("abc")
        );

        store.remove(ACCESS_TOKEN_KEY).await.unwrap();
        assert!(store.get(ACCESS_TOKEN_KEY).await.unwrap().is_none());
    }
}
