use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use utoipa::ToSchema;

use super::error::{ErrorCode, JobError};

/// A validated request to transcode one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub video_id: String,
    pub source_key: String,
    /// Re-transcode even if the video was already published from another source.
    pub force: bool,
}

impl JobDescriptor {
    pub fn new(video_id: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            source_key: source_key.into(),
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Pipeline state of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Acquiring,
    Encoding,
    Publishing,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Acquiring => "acquiring",
            JobState::Encoding => "encoding",
            JobState::Publishing => "publishing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable checkpoint recorded in the job ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    Started,
    /// Source downloaded into the workspace.
    Acquired,
    /// Encoder produced the package and thumbnail in the workspace.
    Encoded,
    /// Artifacts are durable at their public locations.
    Placed,
    /// Video record flipped to published.
    Published,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Started => "STARTED",
            JobStage::Acquired => "ACQUIRED",
            JobStage::Encoded => "ENCODED",
            JobStage::Placed => "PLACED",
            JobStage::Published => "PUBLISHED",
            JobStage::Failed => "FAILED",
        }
    }
}

impl FromStr for JobStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(JobStage::Started),
            "ACQUIRED" => Ok(JobStage::Acquired),
            "ENCODED" => Ok(JobStage::Encoded),
            "PLACED" => Ok(JobStage::Placed),
            "PUBLISHED" => Ok(JobStage::Published),
            "FAILED" => Ok(JobStage::Failed),
            other => Err(format!("unknown job stage '{}'", other)),
        }
    }
}

/// Public locations of the two artifacts a video record points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishedUrls {
    pub hls_master_url: String,
    pub thumb_url: String,
}

/// Publication columns of a `videos` row.
#[derive(Debug, Clone, FromRow)]
pub struct VideoStatusRow {
    pub status: Option<String>,
    pub hls_master_url: Option<String>,
    pub thumb_url: Option<String>,
}

/// Ledger row as stored in `transcode_jobs`.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub video_id: String,
    pub source_key: String,
    pub stage: String,
    pub hls_master_url: Option<String>,
    pub thumb_url: Option<String>,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub attempts: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub video_id: String,
    pub source_key: String,
    pub stage: JobStage,
    pub hls_master_url: Option<String>,
    pub thumb_url: Option<String>,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub attempts: i32,
    #[serde(with = "time::serde::iso8601")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::iso8601")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
}

impl JobRecord {
    /// Both URLs, present once artifacts have been placed.
    pub fn urls(&self) -> Option<PublishedUrls> {
        match (&self.hls_master_url, &self.thumb_url) {
            (Some(hls), Some(thumb)) => Some(PublishedUrls {
                hls_master_url: hls.clone(),
                thumb_url: thumb.clone(),
            }),
            _ => None,
        }
    }
}

impl TryFrom<JobRow> for JobRecord {
    type Error = String;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            stage: row.stage.parse()?,
            video_id: row.video_id,
            source_key: row.source_key,
            hls_master_url: row.hls_master_url,
            thumb_url: row.thumb_url,
            error_code: row.error_code,
            error: row.error,
            attempts: row.attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub ok: bool,
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl JobResult {
    pub fn success(video_id: impl Into<String>) -> Self {
        Self {
            ok: true,
            video_id: video_id.into(),
            code: None,
            error: None,
            retryable: None,
        }
    }

    pub fn failure(video_id: impl Into<String>, err: &JobError) -> Self {
        Self {
            ok: false,
            video_id: video_id.into(),
            code: Some(err.code()),
            error: Some(err.to_string()),
            retryable: Some(err.is_retryable()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable == Some(true)
    }
}
