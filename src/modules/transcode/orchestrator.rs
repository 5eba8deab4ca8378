//! Job lifecycle: acquire, encode, place, publish.

use std::sync::Arc;

use tracing::{Instrument, error, info, info_span, warn};

use super::encoder::EncodingInvoker;
use super::error::JobError;
use super::ledger::JobLedger;
use super::model::{JobDescriptor, JobRecord, JobResult, JobStage, JobState, PublishedUrls};
use super::recorder::StatusRecorder;
use super::transfer::{ArtifactTransfer, placement_prefix};
use super::workspace::{Workspace, WorkspaceManager};

/// What a run has to do given the ledger entry left by earlier runs.
#[derive(Debug, PartialEq, Eq)]
enum Plan {
    /// Run the whole pipeline from acquisition.
    Fresh,
    /// Artifacts are already placed; only the status update is outstanding.
    ResumePublish(PublishedUrls),
    /// Published from the same source; re-assert the status and stop.
    AlreadyPublished(PublishedUrls),
}

fn plan(prior: Option<&JobRecord>, job: &JobDescriptor) -> Result<Plan, JobError> {
    let Some(prior) = prior else {
        return Ok(Plan::Fresh);
    };
    if job.force {
        return Ok(Plan::Fresh);
    }

    let same_source = prior.source_key == job.source_key;
    match (prior.stage, prior.urls()) {
        (JobStage::Published, Some(urls)) if same_source => Ok(Plan::AlreadyPublished(urls)),
        (JobStage::Published, _) if !same_source => Err(JobError::Conflict(format!(
            "video {} is already published from {}; resubmit with force to re-transcode",
            job.video_id, prior.source_key
        ))),
        (JobStage::Placed, Some(urls)) if same_source => Ok(Plan::ResumePublish(urls)),
        _ => Ok(Plan::Fresh),
    }
}

pub struct TranscodeOrchestrator {
    workspaces: WorkspaceManager,
    transfer: ArtifactTransfer,
    encoder: EncodingInvoker,
    recorder: StatusRecorder,
    ledger: Arc<dyn JobLedger>,
}

impl TranscodeOrchestrator {
    pub fn new(
        workspaces: WorkspaceManager,
        transfer: ArtifactTransfer,
        encoder: EncodingInvoker,
        recorder: StatusRecorder,
        ledger: Arc<dyn JobLedger>,
    ) -> Self {
        Self {
            workspaces,
            transfer,
            encoder,
            recorder,
            ledger,
        }
    }

    /// Run one job to completion. Never leaves the video record published
    /// when the returned result is a failure.
    pub async fn run(&self, job: &JobDescriptor) -> JobResult {
        let span = info_span!(
            "transcode_job",
            video_id = %job.video_id,
            source_key = %job.source_key
        );

        async {
            let start = std::time::Instant::now();
            match self.execute(job).await {
                Ok(()) => {
                    info!(
                        state = %JobState::Done,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "✅ Job completed"
                    );
                    JobResult::success(&job.video_id)
                }
                Err(e) => {
                    error!(
                        state = %JobState::Failed,
                        code = e.code().as_str(),
                        retryable = e.is_retryable(),
                        error = %e,
                        "❌ Job failed"
                    );
                    JobResult::failure(&job.video_id, &e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, job: &JobDescriptor) -> Result<(), JobError> {
        let prior = self.ledger.find(&job.video_id).await?;

        match plan(prior.as_ref(), job)? {
            Plan::AlreadyPublished(urls) => {
                info!("Already published from this source; re-asserting status");
                self.recorder.mark_published(&job.video_id, &urls).await?;
                Ok(())
            }
            Plan::ResumePublish(urls) => {
                info!("Artifacts already placed; resuming at status update");
                self.ledger.resume(&job.video_id).await?;
                let result = self.publish(&job.video_id, &urls).await;
                self.settle(&job.video_id, result).await
            }
            Plan::Fresh => {
                let record = self.ledger.begin(&job.video_id, &job.source_key).await?;
                let result = self.run_pipeline(job, record.attempts).await;
                self.settle(&job.video_id, result).await
            }
        }
    }

    async fn run_pipeline(&self, job: &JobDescriptor, attempt: i32) -> Result<(), JobError> {
        // A live record keeps serving its keys; this run places beside them
        // and only the status update moves the URLs over.
        let generation = self
            .recorder
            .live_urls(&job.video_id)
            .await?
            .map(|_| format!("g{}", attempt));
        let prefix = placement_prefix(&job.video_id, generation.as_deref());

        let workspace = self
            .workspaces
            .prepare(&job.video_id)
            .await
            .map_err(JobError::Workspace)?;

        let produced = self.produce(job, &workspace, &prefix).await;
        workspace.cleanup().await;
        let urls = produced?;

        self.ledger
            .checkpoint(&job.video_id, JobStage::Placed, Some(&urls))
            .await?;

        self.publish(&job.video_id, &urls).await
    }

    async fn produce(
        &self,
        job: &JobDescriptor,
        workspace: &Workspace,
        prefix: &str,
    ) -> Result<PublishedUrls, JobError> {
        info!(state = %JobState::Acquiring, "Downloading source");
        self.transfer
            .fetch(&job.source_key, workspace.input())
            .await
            .map_err(JobError::Acquisition)?;
        self.note_checkpoint(&job.video_id, JobStage::Acquired).await;

        info!(state = %JobState::Encoding, "Encoding");
        self.encoder
            .transcode(workspace.input(), workspace.output_dir())
            .await?;
        self.note_checkpoint(&job.video_id, JobStage::Encoded).await;

        info!(state = %JobState::Publishing, prefix = %prefix, "Placing artifacts");
        self.transfer
            .place_outputs(prefix, workspace.output_dir())
            .await
            .map_err(JobError::Placement)
    }

    /// Flip the video record. Only called once both artifacts are durable at
    /// their public locations.
    async fn publish(&self, video_id: &str, urls: &PublishedUrls) -> Result<(), JobError> {
        self.recorder.mark_published(video_id, urls).await?;
        self.note_checkpoint(video_id, JobStage::Published).await;
        Ok(())
    }

    /// Failures here are logged, not propagated.
    async fn note_checkpoint(&self, video_id: &str, stage: JobStage) {
        if let Err(e) = self.ledger.checkpoint(video_id, stage, None).await {
            warn!(stage = stage.as_str(), error = %e, "Failed to record checkpoint");
        }
    }

    async fn settle(&self, video_id: &str, result: Result<(), JobError>) -> Result<(), JobError> {
        if let Err(e) = &result {
            if let Err(ledger_err) = self.ledger.fail(video_id, e.code().as_str(), &e.to_string()).await {
                warn!(error = %ledger_err, "Failed to record job failure");
            }
        }
        result
    }
}
