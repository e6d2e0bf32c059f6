use async_trait::async_trait;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(String),
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Streaming read handle on a stored object.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download an object to a local path
    async fn download(&self, key: &str, local_path: &Path) -> Result<(), StorageError>;

    /// Upload a local file, overwriting any object under `key`
    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StorageError>;

    /// Open an object for streaming reads
    async fn open(&self, key: &str) -> Result<ObjectReader, StorageError>;

    /// Keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn download(&self, key: &str, local_path: &Path) -> Result<(), StorageError> {
        (**self).download(key, local_path).await
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StorageError> {
        (**self).upload(local_path, key).await
    }

    async fn open(&self, key: &str) -> Result<ObjectReader, StorageError> {
        (**self).open(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        (**self).list(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key).await
    }
}
