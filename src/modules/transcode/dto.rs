use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use super::error::JobError;
use super::model::JobDescriptor;

/// Body of `POST /jobs/transcode`, and the payload of queued jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeRequest {
    #[serde(default)]
    #[validate(
        length(min = 1, message = "videoId is required"),
        custom(function = "validate_video_id")
    )]
    pub video_id: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "sourceKey is required"))]
    pub source_key: String,

    /// Re-transcode a video that is already published from another source.
    #[serde(default)]
    pub force: bool,
}

/// The id names a workspace directory and an object key prefix, so it must
/// stay a single path segment.
fn validate_video_id(video_id: &str) -> Result<(), ValidationError> {
    let invalid = video_id == "."
        || video_id == ".."
        || video_id.len() > 128
        || video_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control() || c.is_whitespace());

    if invalid {
        return Err(ValidationError::new("video_id")
            .with_message(Cow::Borrowed("videoId must be a single path segment")));
    }
    Ok(())
}

fn describe(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field))
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

impl TranscodeRequest {
    pub fn into_descriptor(self) -> Result<JobDescriptor, JobError> {
        self.validate()
            .map_err(|e| JobError::Validation(describe(&e)))?;

        Ok(JobDescriptor {
            video_id: self.video_id,
            source_key: self.source_key,
            force: self.force,
        })
    }
}

impl From<&JobDescriptor> for TranscodeRequest {
    fn from(job: &JobDescriptor) -> Self {
        Self {
            video_id: job.video_id.clone(),
            source_key: job.source_key.clone(),
            force: job.force,
        }
    }
}
