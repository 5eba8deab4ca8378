use tracing::warn;

use super::dto::TranscodeRequest;
use super::error::JobError;
use super::model::{JobDescriptor, JobRecord, JobResult};
use crate::state::AppState;

pub struct TranscodeService;

impl TranscodeService {
    /// Validate, then run the job on its own task and wait for it.
    /// Errors are only returned for requests that never reached the pipeline.
    ///
    /// The job outlives the caller: dropping this future (a client hanging
    /// up) leaves the task to finish, settle the ledger and release the lock.
    pub async fn submit(state: AppState, req: TranscodeRequest) -> Result<JobResult, JobError> {
        let job = req.into_descriptor()?;

        tokio::spawn(Self::run_locked(state, job))
            .await
            .map_err(|e| JobError::Task(e.to_string()))?
    }

    async fn run_locked(state: AppState, job: JobDescriptor) -> Result<JobResult, JobError> {
        let token = state
            .locks
            .acquire(&job.video_id, state.config.job_lock_ttl())
            .await?
            .ok_or_else(|| JobError::InFlight(job.video_id.clone()))?;

        let result = state.orchestrator.run(&job).await;

        if let Err(e) = state.locks.release(&job.video_id, &token).await {
            warn!(video_id = %job.video_id, error = %e, "Failed to release job lock");
        }

        Ok(result)
    }

    pub async fn find_job(state: AppState, video_id: &str) -> Result<Option<JobRecord>, JobError> {
        Ok(state.ledger.find(video_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::modules::transcode::model::JobStage;
    use crate::modules::transcode::testing::{FakeEngine, test_app_with};

    fn request(video_id: &str) -> TranscodeRequest {
        TranscodeRequest {
            video_id: video_id.to_string(),
            source_key: "uploads/v1/raw.mp4".to_string(),
            force: false,
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn dropped_caller_does_not_cancel_the_job() {
        let gate = Arc::new(Notify::new());
        let engine = Arc::new(FakeEngine::gated(gate.clone()));
        let app = test_app_with(&["v1"], engine.clone());

        let caller = tokio::spawn(TranscodeService::submit(app.state.clone(), request("v1")));
        wait_until(|| !engine.calls().is_empty()).await;
        assert!(app.locks.is_held("v1"));

        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        gate.notify_one();

        wait_until(|| !app.locks.is_held("v1")).await;
        assert_eq!(app.ledger.entry("v1").unwrap().stage, JobStage::Published);
        assert_eq!(app.videos.record("v1").unwrap().status, "PUBLISHED");
    }

    #[tokio::test]
    async fn held_lock_is_reported_in_flight() {
        let app = test_app_with(&["v1"], Arc::new(FakeEngine::succeeding()));
        app.locks.hold("v1");

        let err = TranscodeService::submit(app.state.clone(), request("v1"))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::InFlight(id) if id == "v1"));
        assert!(app.ledger.entry("v1").is_none());
    }
}
