//! Object store abstraction used for fetching sources and placing artifacts.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Readable body of a stored object. Errors surfacing mid-stream are reported
/// through the reader as `std::io::Error`.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a byte stream over the object stored at `key`.
    async fn get(&self, key: &str) -> StorageResult<ByteReader>;

    /// Store the file at `path` under `key`. Must not return before the
    /// object is durable at its destination.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<()>;
}
