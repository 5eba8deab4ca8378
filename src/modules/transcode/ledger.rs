//! Durable per-video checkpoints used to resume or re-drive a job.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use super::model::{JobRecord, JobStage, PublishedUrls};
use super::repository::JobRepository;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt ledger entry for {video_id}: {reason}")]
    Corrupt { video_id: String, reason: String },

    #[error("No ledger entry for {0}")]
    Missing(String),
}

#[async_trait]
pub trait JobLedger: Send + Sync {
    async fn find(&self, video_id: &str) -> Result<Option<JobRecord>, LedgerError>;

    /// Open a fresh attempt at `STARTED`, clearing earlier URLs and errors.
    async fn begin(&self, video_id: &str, source_key: &str) -> Result<JobRecord, LedgerError>;

    /// Count a new attempt that continues from the stored checkpoint.
    async fn resume(&self, video_id: &str) -> Result<(), LedgerError>;

    async fn checkpoint(
        &self,
        video_id: &str,
        stage: JobStage,
        urls: Option<&PublishedUrls>,
    ) -> Result<(), LedgerError>;

    /// Record the failure of the current attempt. A `PLACED` checkpoint survives.
    async fn fail(&self, video_id: &str, code: &str, error: &str) -> Result<(), LedgerError>;
}

pub struct PgJobLedger {
    pool: PgPool,
}

impl PgJobLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn require_row(video_id: &str, rows: u64) -> Result<(), LedgerError> {
    if rows == 0 {
        return Err(LedgerError::Missing(video_id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl JobLedger for PgJobLedger {
    async fn find(&self, video_id: &str) -> Result<Option<JobRecord>, LedgerError> {
        JobRepository::find(&self.pool, video_id)
            .await?
            .map(|row| {
                JobRecord::try_from(row).map_err(|reason| LedgerError::Corrupt {
                    video_id: video_id.to_string(),
                    reason,
                })
            })
            .transpose()
    }

    async fn begin(&self, video_id: &str, source_key: &str) -> Result<JobRecord, LedgerError> {
        let row = JobRepository::begin(&self.pool, video_id, source_key).await?;
        JobRecord::try_from(row).map_err(|reason| LedgerError::Corrupt {
            video_id: video_id.to_string(),
            reason,
        })
    }

    async fn resume(&self, video_id: &str) -> Result<(), LedgerError> {
        let rows = JobRepository::resume(&self.pool, video_id).await?;
        require_row(video_id, rows)
    }

    async fn checkpoint(
        &self,
        video_id: &str,
        stage: JobStage,
        urls: Option<&PublishedUrls>,
    ) -> Result<(), LedgerError> {
        let rows = JobRepository::checkpoint(&self.pool, video_id, stage, urls).await?;
        require_row(video_id, rows)
    }

    async fn fail(&self, video_id: &str, code: &str, error: &str) -> Result<(), LedgerError> {
        let rows = JobRepository::fail(&self.pool, video_id, code, error).await?;
        require_row(video_id, rows)
    }
}
