use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::dto::TranscodeRequest;
use super::error::ErrorCode;
use super::model::{JobRecord, JobResult};
use super::service::TranscodeService;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::state::AppState;

/// Run a transcode job to completion
#[utoipa::path(
    post,
    path = "/jobs/transcode",
    request_body = TranscodeRequest,
    responses(
        (status = 200, description = "Video published", body = ApiResponse<JobResult>),
        (status = 400, description = "Invalid job"),
        (status = 409, description = "Job already in flight, or video published from another source"),
        (status = 500, description = "Job failed")
    ),
    tag = "Transcode"
)]
pub async fn submit_transcode(
    State(state): State<AppState>,
    payload: Result<Json<TranscodeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return ApiError::new(StatusCode::BAD_REQUEST, ErrorCode::Validation, rejection.body_text())
                .into_response();
        }
    };

    match TranscodeService::submit(state, req).await {
        Ok(result) if result.ok => {
            ApiSuccess(ApiResponse::success(result), StatusCode::OK).into_response()
        }
        Ok(result) => ApiError::from_result(&result).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Get the ledger entry of a video's latest job
#[utoipa::path(
    get,
    path = "/jobs/{video_id}",
    params(
        ("video_id" = String, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Job ledger entry", body = ApiResponse<JobRecord>),
        (status = 404, description = "No job recorded for this video")
    ),
    tag = "Transcode"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> impl IntoResponse {
    match TranscodeService::find_job(state, &video_id).await {
        Ok(Some(record)) => {
            ApiSuccess(ApiResponse::success(record), StatusCode::OK).into_response()
        }
        Ok(None) => ApiError::new(
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
            format!("No job recorded for video {}", video_id),
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::modules::transcode::testing::{TestApp, test_app};

    async fn call(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let response = crate::app::create_app(app.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_job(body: &str) -> Request<Body> {
        Request::post("/jobs/transcode")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn successful_job_returns_result_envelope() {
        let app = test_app(&["v1"]);

        let (status, body) = call(&app, post_job(r#"{"videoId":"v1","sourceKey":"uploads/v1/raw.mp4"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "result": { "ok": true, "videoId": "v1" } }));
        assert_eq!(app.videos.record("v1").unwrap().status, "PUBLISHED");
        assert!(!app.locks.is_held("v1"));
    }

    #[tokio::test]
    async fn missing_source_key_is_bad_request() {
        let app = test_app(&["v1"]);

        let (status, body) = call(&app, post_job(r#"{"videoId":"v1"}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "VALIDATION");
        assert!(app.ledger.entry("v1").is_none());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = test_app(&["v1"]);

        let (status, body) = call(&app, post_job("{not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION");
    }

    #[tokio::test]
    async fn held_lock_is_a_conflict() {
        let app = test_app(&["v1"]);
        app.locks.hold("v1");

        let (status, body) = call(&app, post_job(r#"{"videoId":"v1","sourceKey":"uploads/v1/raw.mp4"}"#)).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "IN_FLIGHT");
        assert_eq!(body["retryable"], true);
        assert_eq!(app.videos.record("v1").unwrap().status, "UPLOADED");
    }

    #[tokio::test]
    async fn failed_job_is_server_error_and_releases_lock() {
        let app = test_app(&["v1"]);

        let (status, body) = call(&app, post_job(r#"{"videoId":"v1","sourceKey":"uploads/v1/gone.mp4"}"#)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "NOT_FOUND");
        assert!(!app.locks.is_held("v1"));
    }

    #[tokio::test]
    async fn job_entry_is_readable_after_run() {
        let app = test_app(&["v1"]);
        call(&app, post_job(r#"{"videoId":"v1","sourceKey":"uploads/v1/raw.mp4"}"#)).await;

        let (status, body) = call(&app, Request::get("/jobs/v1").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["stage"], "PUBLISHED");
        assert_eq!(
            body["result"]["hlsMasterUrl"],
            "https://cdn.example.com/videos/v1/master.m3u8"
        );

        let (status, _) = call(&app, Request::get("/jobs/v2").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn root_describes_the_service() {
        let app = test_app(&[]);

        let (status, body) = call(&app, Request::get("/").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "service": "transcoder" }));
    }
}
