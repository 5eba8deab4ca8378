use utoipa::OpenApi;

use crate::modules::transcode::dto::TranscodeRequest;
use crate::modules::transcode::error::ErrorCode;
use crate::modules::transcode::model::{JobRecord, JobResult, JobStage};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::transcode::handler::submit_transcode,
        crate::modules::transcode::handler::get_job,
    ),
    components(
        schemas(TranscodeRequest, JobResult, JobRecord, JobStage, ErrorCode)
    ),
    tags(
        (name = "Transcode", description = "Transcoding jobs")
    )
)]
pub struct ApiDoc;
