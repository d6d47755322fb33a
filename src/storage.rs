use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Fixed key under which the offline queue persists its items.
pub const OFFLINE_QUEUE_KEY: &str = "error_shipper.offline_queue";

/// Fixed key under which the quota ledger persists its counters.
pub const QUOTA_LEDGER_KEY: &str = "error_shipper.quota_ledger";

/// A durable-store operation failed.
///
/// Callers log the first failure and otherwise carry on; state then lives
/// only in memory for the session.
#[derive(Debug, Clone)]
pub struct StoreError {
    pub detail: String,
}

impl StoreError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "durable store failure: {}", self.detail)
    }
}

impl std::error::Error for StoreError {}

/// String key-value store backing the state that survives restarts.
///
/// The shipper uses exactly two keys: [`OFFLINE_QUEUE_KEY`] and
/// [`QUOTA_LEDGER_KEY`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str);
}

/// In-memory store for tests and non-durable deployments.
#[derive(Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.lock().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) {
        self.values.lock().await.remove(key);
    }
}

/// On-disk store: one file per key under a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| StoreError::new(format!("create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are dotted identifiers; anything else is flattened defensively.
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        std::fs::write(&path, value)
            .map_err(|e| StoreError::new(format!("write {}: {}", path.display(), e)))
    }

    async fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}
