//! Moving bytes between the object stores and the local workspace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::model::PublishedUrls;
use crate::infrastructure::storage::{ObjectStore, StorageError, StorageResult};

pub const MANIFEST_NAME: &str = "master.m3u8";
pub const THUMBNAIL_NAME: &str = "thumb.jpg";

/// Key prefix of one placement: `videos/{video_id}`, or
/// `videos/{video_id}/{generation}` when a live copy must not be overwritten.
pub fn placement_prefix(video_id: &str, generation: Option<&str>) -> String {
    match generation {
        Some(generation) => format!("videos/{}/{}", video_id, generation),
        None => format!("videos/{}", video_id),
    }
}

fn urls_under(public_base: &str, prefix: &str) -> PublishedUrls {
    let base = public_base.trim_end_matches('/');
    PublishedUrls {
        hls_master_url: format!("{}/{}/{}", base, prefix, MANIFEST_NAME),
        thumb_url: format!("{}/{}/{}", base, prefix, THUMBNAIL_NAME),
    }
}

/// URLs of a placement under the base prefix.
#[cfg(test)]
pub fn published_urls(public_base: &str, video_id: &str) -> PublishedUrls {
    urls_under(public_base, &placement_prefix(video_id, None))
}

fn content_type(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl".to_string(),
        Some("ts") => "video/mp2t".to_string(),
        _ => mime_guess::from_path(path).first_or_octet_stream().to_string(),
    }
}

pub struct ArtifactTransfer {
    source: Arc<dyn ObjectStore>,
    destination: Arc<dyn ObjectStore>,
    public_base: String,
}

impl ArtifactTransfer {
    pub fn new(
        source: Arc<dyn ObjectStore>,
        destination: Arc<dyn ObjectStore>,
        public_base: impl Into<String>,
    ) -> Self {
        Self {
            source,
            destination,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Stream `source_key` into `dest`. Returns only after the file is
    /// flushed, synced and closed; on any failure the partial file is removed.
    pub async fn fetch(&self, source_key: &str, dest: &Path) -> StorageResult<u64> {
        let mut reader = self.source.get(source_key).await?;

        let write = async {
            let mut file = fs::File::create(dest).await?;
            let bytes = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(bytes)
        };

        match write.await {
            Ok(bytes) => {
                info!(key = %source_key, path = %dest.display(), size_bytes = bytes, "Source downloaded");
                Ok(bytes)
            }
            Err(e) => {
                let _ = fs::remove_file(dest).await;
                Err(StorageError::DownloadFailed(format!("{}: {}", source_key, e)))
            }
        }
    }

    /// Place one local file at `dest_key` in the destination store and return
    /// its public URL.
    pub async fn publish(&self, local_path: &Path, dest_key: &str) -> StorageResult<String> {
        self.destination
            .put_file(dest_key, local_path, &content_type(local_path))
            .await?;
        debug!(key = %dest_key, "Artifact placed");
        Ok(format!("{}/{}", self.public_base, dest_key))
    }

    /// Place the whole output tree under `prefix` (see [`placement_prefix`]).
    /// Segments go first, then the thumbnail, and the manifest last so it
    /// never references a segment that is not yet reachable.
    pub async fn place_outputs(&self, prefix: &str, output_dir: &Path) -> StorageResult<PublishedUrls> {
        let manifest = output_dir.join(MANIFEST_NAME);
        let thumbnail = output_dir.join(THUMBNAIL_NAME);
        for required in [&manifest, &thumbnail] {
            if !fs::try_exists(required).await? {
                return Err(StorageError::MissingArtifact(required.display().to_string()));
            }
        }

        let mut files = collect_files(output_dir).await?;
        files.sort();
        files.retain(|p| p != &manifest && p != &thumbnail);
        files.push(thumbnail);
        files.push(manifest);

        let mut placed = 0usize;
        for path in &files {
            let relative = relative_key(output_dir, path)?;
            self.publish(path, &format!("{}/{}", prefix, relative)).await?;
            placed += 1;
        }

        info!(prefix = %prefix, files = placed, "Artifacts placed");
        Ok(urls_under(&self.public_base, prefix))
    }
}

async fn collect_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    Ok(files)
}

fn relative_key(base: &Path, path: &Path) -> StorageResult<String> {
    let relative = path
        .strip_prefix(base)
        .map_err(|_| StorageError::InvalidKey(path.display().to_string()))?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
