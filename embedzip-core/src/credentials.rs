//! Credential lookup abstraction
//!
//! Provides a trait for credential lookup with implementations for:
//! - EnvStore: Reads process environment variables
//! - MemoryStore: In-memory storage for explicit keys and testing

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Name of the credential holding the Google Generative AI API key
pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";

/// Errors that can occur during credential lookup
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} is set but empty")]
    Empty(String),
}

/// Trait for credential lookup backends
pub trait CredentialStore: Send + Sync {
    /// Get a credential by name
    fn get(&self, name: &str) -> Result<String, CredentialError>;
}

/// Environment-backed credential store
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvStore;

impl EnvStore {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialStore for EnvStore {
    fn get(&self, name: &str) -> Result<String, CredentialError> {
        match std::env::var(name) {
            Ok(value) if value.trim().is_empty() => Err(CredentialError::Empty(name.to_string())),
            Ok(value) => Ok(value.trim().to_string()),
            Err(_) => Err(CredentialError::NotFound(name.to_string())),
        }
    }
}

/// In-memory credential store
#[derive(Clone, Default)]
pub struct MemoryStore {
    store: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a store with pre-populated credentials
    pub fn with_credentials<K, V>(credentials: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (name, value) in credentials {
            store.set(name, value);
        }
        store
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.insert(name.into(), value.into());
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, name: &str) -> Result<String, CredentialError> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        match store.get(name) {
            Some(value) if value.trim().is_empty() => {
                Err(CredentialError::Empty(name.to_string()))
            }
            Some(value) => Ok(value.trim().to_string()),
            None => Err(CredentialError::NotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_get_set() {
        let store = MemoryStore::new();
        store.set(GOOGLE_API_KEY, "secret123");
        assert_eq!(store.get(GOOGLE_API_KEY).unwrap(), "secret123");
    }

    #[test]
    fn test_memory_store_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get(GOOGLE_API_KEY),
            Err(CredentialError::NotFound(_))
        ));
    }

    #[test]
    fn test_memory_store_blank_value_is_empty() {
        let store = MemoryStore::with_credentials([(GOOGLE_API_KEY, "   ")]);
        assert!(matches!(
            store.get(GOOGLE_API_KEY),
            Err(CredentialError::Empty(_))
        ));
    }

    #[test]
    fn test_memory_store_with_credentials() {
        let store = MemoryStore::with_credentials([("a", "1"), ("b", "2")]);
        assert_eq!(store.get("a").unwrap(), "1");
        assert_eq!(store.get("b").unwrap(), "2");
    }

    #[test]
    fn test_env_store_missing_variable() {
        let store = EnvStore::new();
        let err = store.get("EMBEDZIP_TEST_SURELY_UNSET_VARIABLE").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
