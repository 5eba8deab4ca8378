use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::modules::transcode::error::{ErrorCode, JobError};
use crate::modules::transcode::model::JobResult;

#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(result: T) -> Self {
        Self {
            ok: true,
            result: Some(result),
            code: None,
            error: None,
            retryable: None,
        }
    }

    pub fn error(code: ErrorCode, message: &str, retryable: bool) -> Self {
        Self {
            ok: false,
            result: None,
            code: Some(code),
            error: Some(message.to_string()),
            retryable: Some(retryable),
        }
    }
}

pub struct ApiSuccess<T>(pub T, pub StatusCode);

impl<T> IntoResponse for ApiSuccess<ApiResponse<T>>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let (response, status) = (self.0, self.1);
        (status, Json(response)).into_response()
    }
}

/// HTTP status for a job error code. Anything that is not the caller's fault
/// is a 500.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict | ErrorCode::InFlight => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retryable: false,
        }
    }

    /// Error response for a job that ran and failed.
    pub fn from_result(result: &JobResult) -> Self {
        let code = result.code.unwrap_or(ErrorCode::Internal);
        Self {
            status: status_for(code),
            code,
            message: result.error.clone().unwrap_or_else(|| "transcode failed".to_string()),
            retryable: result.is_retryable(),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        let code = e.code();
        Self {
            status: status_for(code),
            code,
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ApiResponse::<()>::error(self.code, &self.message, self.retryable);
        (self.status, Json(response)).into_response()
    }
}
