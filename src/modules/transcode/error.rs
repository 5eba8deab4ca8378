//! Job-level error taxonomy.

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use super::encoder::EncodeError;
use super::ledger::LedgerError;
use super::recorder::RecorderError;
use crate::infrastructure::storage::StorageError;

/// Stable code reported to callers alongside the error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    Conflict,
    InFlight,
    NotFound,
    Transient,
    Encoding,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InFlight => "IN_FLIGHT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Transient => "TRANSIENT",
            ErrorCode::Encoding => "ENCODING",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Retry classification. Only `Transient` failures are worth re-driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transient,
    Permanent,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid job: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("A job for video {0} is already in flight")]
    InFlight(String),

    #[error("Workspace error: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Acquisition failed: {0}")]
    Acquisition(#[source] StorageError),

    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodeError),

    #[error("Artifact placement failed: {0}")]
    Placement(#[source] StorageError),

    #[error("Publish failed: {0}")]
    Publish(#[from] RecorderError),

    #[error("Job ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Lock service error: {0}")]
    Lock(String),

    #[error("Job task failed: {0}")]
    Task(String),
}

impl JobError {
    pub fn code(&self) -> ErrorCode {
        match self {
            JobError::Validation(_) => ErrorCode::Validation,
            JobError::Conflict(_) => ErrorCode::Conflict,
            JobError::InFlight(_) => ErrorCode::InFlight,
            JobError::Workspace(_) => ErrorCode::Internal,
            JobError::Acquisition(e) if e.is_not_found() => ErrorCode::NotFound,
            JobError::Acquisition(StorageError::InvalidKey(_)) => ErrorCode::Validation,
            JobError::Acquisition(_) => ErrorCode::Transient,
            JobError::Encoding(EncodeError::Spawn(_)) => ErrorCode::Internal,
            JobError::Encoding(_) => ErrorCode::Encoding,
            JobError::Placement(StorageError::MissingArtifact(_)) => ErrorCode::Encoding,
            JobError::Placement(_) => ErrorCode::Transient,
            JobError::Publish(RecorderError::NotFound(_)) => ErrorCode::NotFound,
            JobError::Publish(_) => ErrorCode::Transient,
            JobError::Ledger(_) => ErrorCode::Transient,
            JobError::Lock(_) => ErrorCode::Transient,
            JobError::Task(_) => ErrorCode::Internal,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code() {
            ErrorCode::Validation | ErrorCode::Conflict => ErrorKind::Validation,
            ErrorCode::InFlight | ErrorCode::Transient => ErrorKind::Transient,
            ErrorCode::NotFound | ErrorCode::Encoding | ErrorCode::Internal => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
