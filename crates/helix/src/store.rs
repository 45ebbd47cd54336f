//! Token persistence abstraction.
//!
//! The token manager persists exactly one record per storage namespace.
//! The concrete backend is injected: tests and short-lived embedders use
//! [`MemoryTokenStore`], the CLI uses [`FileTokenStore`].

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors from the persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A durable string key-value store.
///
/// Values are opaque to the store; the token manager serializes its own
/// record into them. A backend that loses or corrupts a value is
/// tolerated: the manager treats anything it cannot parse as absent.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// File-backed store: one JSON object mapping keys to values.
///
/// The file holds credentials material, so it is created with mode 0600
/// on unix. A file that fails to parse is treated as empty rather than
/// raised; the next write replaces it.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn read_map(&self) -> HashMap<String, String> {
        let Ok(raw) = tokio::fs::read_to_string(&self.path).await else {
            return HashMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    async fn write_map(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let raw = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&self.path, raw).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_map().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut map = self.read_map().await;
        map.insert(key.to_owned(), value.to_owned());
        self.write_map(&map).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.read_map().await;
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.write_map(&map).await
    }
}
