//! Terminal status update of the video record.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::model::PublishedUrls;
use super::repository::{PUBLISHED_STATUS, VideoRepository};

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Video record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The metadata store's conditional row update.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Set status to published with both URLs. Re-applying the same values is a no-op.
    async fn mark_published(&self, video_id: &str, urls: &PublishedUrls) -> Result<(), RecorderError>;

    /// URLs the record currently serves, if it is published.
    async fn live_urls(&self, video_id: &str) -> Result<Option<PublishedUrls>, RecorderError>;
}

/// `videos.id` is a uuid column; anything else cannot name a row.
fn video_uuid(video_id: &str) -> Result<Uuid, RecorderError> {
    Uuid::parse_str(video_id).map_err(|_| RecorderError::NotFound(video_id.to_string()))
}

pub struct PgVideoStore {
    pool: PgPool,
}

impl PgVideoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoStore for PgVideoStore {
    async fn mark_published(&self, video_id: &str, urls: &PublishedUrls) -> Result<(), RecorderError> {
        let rows = VideoRepository::mark_published(&self.pool, video_uuid(video_id)?, urls).await?;
        if rows == 0 {
            return Err(RecorderError::NotFound(video_id.to_string()));
        }
        Ok(())
    }

    async fn live_urls(&self, video_id: &str) -> Result<Option<PublishedUrls>, RecorderError> {
        let row = VideoRepository::find_status(&self.pool, video_uuid(video_id)?)
            .await?
            .ok_or_else(|| RecorderError::NotFound(video_id.to_string()))?;

        if row.status.as_deref() != Some(PUBLISHED_STATUS) {
            return Ok(None);
        }
        Ok(row
            .hls_master_url
            .zip(row.thumb_url)
            .map(|(hls_master_url, thumb_url)| PublishedUrls { hls_master_url, thumb_url }))
    }
}

pub struct StatusRecorder {
    store: Arc<dyn VideoStore>,
}

impl StatusRecorder {
    pub fn new(store: Arc<dyn VideoStore>) -> Self {
        Self { store }
    }

    pub async fn mark_published(&self, video_id: &str, urls: &PublishedUrls) -> Result<(), RecorderError> {
        self.store.mark_published(video_id, urls).await?;
        info!(
            video_id = %video_id,
            hls_master_url = %urls.hls_master_url,
            thumb_url = %urls.thumb_url,
            "Video marked published"
        );
        Ok(())
    }

    pub async fn live_urls(&self, video_id: &str) -> Result<Option<PublishedUrls>, RecorderError> {
        self.store.live_urls(video_id).await
    }
}
