//! Filesystem-backed object store.
//!
//! Used when artifacts are served straight from a directory that a CDN or
//! sync job exposes at the public base URL.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::traits::{ByteReader, ObjectStore, StorageError, StorageResult};

#[derive(Clone, Debug)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` below the root, refusing anything that could escape it.
    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn get(&self, key: &str) -> StorageResult<ByteReader> {
        let path = self.resolve(key)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn put_file(&self, key: &str, path: &Path, _content_type: &str) -> StorageResult<()> {
        let dest = self.resolve(key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write beside the destination and rename so readers never see a
        // half-copied file.
        let mut staging = dest.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);

        let copy = async {
            let mut src = fs::File::open(path).await?;
            let mut out = fs::File::create(&staging).await?;
            let bytes = tokio::io::copy(&mut src, &mut out).await?;
            out.flush().await?;
            out.sync_all().await?;
            fs::rename(&staging, &dest).await?;
            Ok::<u64, std::io::Error>(bytes)
        };

        match copy.await {
            Ok(bytes) => {
                info!(key = %key, path = %dest.display(), size_bytes = bytes, "Local store put successful");
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                Err(StorageError::UploadFailed(format!("{}: {}", dest.display(), e)))
            }
        }
    }
}
