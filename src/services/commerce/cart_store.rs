use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;

const MAX_KEY_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum CartStoreError {
    #[error("invalid cart key '{0}'")]
    InvalidKey(String),
    #[error("cart storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored cart is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<CartStoreError> for ServiceError {
    fn from(err: CartStoreError) -> Self {
        match err {
            CartStoreError::InvalidKey(key) => {
                ServiceError::ValidationError(format!("invalid cart key '{}'", key))
            }
            other => ServiceError::InternalError(other.to_string()),
        }
    }
}

/// Keyed storage of whole-cart blobs.
///
/// Each `save` replaces the previous blob in one step; readers see either the
/// old or the new cart, never a mix. Concurrent writers are last-writer-wins.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Value>, CartStoreError>;
    async fn save(&self, key: &str, blob: &Value) -> Result<(), CartStoreError>;
    async fn clear(&self, key: &str) -> Result<(), CartStoreError>;
}

fn validate_key(key: &str) -> Result<(), CartStoreError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CartStoreError::InvalidKey(key.to_string()))
    }
}

/// One `<key>.json` file per cart under `root`.
#[derive(Debug, Clone)]
pub struct FileCartStore {
    root: PathBuf,
}

impl FileCartStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CartStore for FileCartStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, CartStoreError> {
        validate_key(key)?;
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, blob: &Value) -> Result<(), CartStoreError> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let bytes = serde_json::to_vec(blob)?;
        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", key, Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes).await?;
        // rename is atomic within one filesystem
        if let Err(e) = tokio::fs::rename(&tmp, self.path_for(key)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(cart_key = key, bytes = bytes.len(), "Cart blob written");
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), CartStoreError> {
        validate_key(key)?;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCartStore {
    blobs: DashMap<String, Value>,
}

impl MemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, CartStoreError> {
        validate_key(key)?;
        Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
    }

    async fn save(&self, key: &str, blob: &Value) -> Result<(), CartStoreError> {
        validate_key(key)?;
        self.blobs.insert(key.to_string(), blob.clone());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), CartStoreError> {
        validate_key(key)?;
        self.blobs.remove(key);
        Ok(())
    }
}
