//! Client-side key/value storage for the session token and client id

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage key for the bearer token
pub const TOKEN_KEY: &str = "fin_assist_token";

/// Storage key for the persisted client id
pub const BROWSER_ID_KEY: &str = "fin_assist_browser_id";

/// Persistent string key/value storage
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value
    fn set(&self, key: &str, value: &str) -> crate::Result<()>;

    /// Remove a value, returning whether it was present
    fn remove(&self, key: &str) -> crate::Result<bool>;

    /// Persisted bearer token, if any
    fn token(&self) -> Option<SessionToken> {
        self.get(TOKEN_KEY)
            .filter(|t| !t.trim().is_empty())
            .map(SessionToken::new)
    }

    /// Persist the bearer token
    fn set_token(&self, token: &SessionToken) -> crate::Result<()> {
        self.set(TOKEN_KEY, token.expose())
    }

    /// Forget the bearer token
    fn clear_token(&self) -> crate::Result<bool> {
        self.remove(TOKEN_KEY)
    }

    /// Forget the bearer token only if it is `rejected`; a different
    /// stored token is left alone
    fn discard_token(&self, rejected: &SessionToken) -> crate::Result<bool> {
        if self.token().as_ref() == Some(rejected) {
            self.clear_token()
        } else {
            Ok(false)
        }
    }

    /// Return the client id, generating and persisting one on first use
    fn client_id(&self) -> crate::Result<String> {
        if let Some(id) = self.get(BROWSER_ID_KEY) {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.set(BROWSER_ID_KEY, &id)?;
        Ok(id)
    }
}

/// Opaque bearer credential issued by the backend
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    /// The raw token, for the `Authorization` header only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible: String = self.0.chars().take(4).collect();
        write!(f, "SessionToken({}…)", visible)
    }
}

/// Store backed by a JSON object file; every mutation rewrites the file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl FileStore {
    /// Open the store at `<dir>/storage.json`
    pub fn open<P: AsRef<Path>>(dir: P) -> crate::Result<Self> {
        let path = dir.as_ref().join("storage.json");
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&content)? {
                    Value::Object(map) => map,
                    _ => {
                        return Err(crate::Error::Storage(format!(
                            "{} does not hold a JSON object",
                            path.display()
                        )))
                    }
                }
            }
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &Map<String, Value>) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), keys = values.len(), "Storage flushed");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .get(key)
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
    }

    fn set(&self, key: &str, value: &str) -> crate::Result<()> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), Value::String(value.to_string()));
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> crate::Result<bool> {
        let mut values = self.values.lock();
        let existed = values.remove(key).is_some();
        if existed {
            self.flush(&values)?;
        }
        Ok(existed)
    }
}

/// In-process store, nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> crate::Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> crate::Result<bool> {
        Ok(self.values.lock().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_persists_across_open() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.set_token(&SessionToken::new("abc123")).unwrap();

        let reopened = FileStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.token(), Some(SessionToken::new("abc123")));
    }

    #[test]
    fn test_clear_token_removes_key_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.set_token(&SessionToken::new("abc123")).unwrap();
        assert!(store.clear_token().unwrap());
        assert!(!store.clear_token().unwrap());

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(!content.contains(TOKEN_KEY));
    }

    #[test]
    fn test_discard_token_keeps_other_token() {
        let store = MemoryStore::new();
        store.set_token(&SessionToken::new("stored")).unwrap();

        assert!(!store.discard_token(&SessionToken::new("other")).unwrap());
        assert_eq!(store.token(), Some(SessionToken::new("stored")));

        assert!(store.discard_token(&SessionToken::new("stored")).unwrap());
        assert!(store.token().is_none());
    }

    #[test]
    fn test_file_store_rejects_non_object() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("storage.json"), "[1, 2]").unwrap();
        let err = FileStore::open(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn test_client_id_is_stable() {
        let store = MemoryStore::new();
        let first = store.client_id().unwrap();
        let second = store.client_id().unwrap();
        assert_eq!(first, second);
        assert!(uuid::Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn test_blank_token_reads_as_absent() {
        let store = MemoryStore::new();
        store.set(TOKEN_KEY, "  ").unwrap();
        assert!(store.token().is_none());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = SessionToken::new("secret-token-value");
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("token-value"));
    }
}
