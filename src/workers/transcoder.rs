use std::time::Duration;

use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicRejectOptions};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::modules::transcode::dto::TranscodeRequest;
use crate::modules::transcode::error::JobError;
use crate::modules::transcode::model::JobResult;
use crate::modules::transcode::service::TranscodeService;
use crate::state::AppState;

pub const TASK_QUEUE: &str = "transcoding_tasks";
pub const DEAD_LETTER_QUEUE: &str = "transcoding_tasks.dead";
const CONSUMER_TAG: &str = "transcoder_worker";

/// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(6))
}

/// Message parked on the dead-letter queue once a job gives up.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeadLetter<'a> {
    request: &'a TranscodeRequest,
    code: &'a str,
    error: &'a str,
    attempts: u32,
}

pub async fn start_transcoder_worker(state: AppState, queue: RabbitMqService) -> anyhow::Result<()> {
    info!("🎥 Starting Transcoder Worker...");

    let mut consumer = queue.consume(TASK_QUEUE, CONSUMER_TAG).await?;

    info!("🎥 Transcoder Worker listening on '{}'", TASK_QUEUE);

    // Jobs run one at a time; each holds an encoder for minutes.
    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => handle_delivery(&state, &queue, delivery).await,
            Err(e) => error!(error = %e, "Failed to receive message"),
        }
    }

    warn!("Transcoder Worker consumer stream ended");
    Ok(())
}

async fn handle_delivery(state: &AppState, queue: &RabbitMqService, delivery: Delivery) {
    let request = match serde_json::from_slice::<TranscodeRequest>(&delivery.data) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "❌ Failed to parse job, rejecting");
            if let Err(e) = delivery.reject(BasicRejectOptions { requeue: false }).await {
                error!(error = %e, "Failed to reject message");
            }
            return;
        }
    };

    info!(video_id = %request.video_id, source_key = %request.source_key, "📦 Received transcoding job");

    let (outcome, attempts) = run_with_retry(state, &request).await;
    let failure = match &outcome {
        Ok(result) if result.ok => None,
        Ok(result) => Some((
            result.code.map(|c| c.as_str()).unwrap_or("INTERNAL"),
            result.error.clone().unwrap_or_default(),
        )),
        Err(e) => Some((e.code().as_str(), e.to_string())),
    };

    if let Some((code, message)) = failure {
        let letter = DeadLetter {
            request: &request,
            code,
            error: &message,
            attempts,
        };
        match serde_json::to_vec(&letter) {
            Ok(payload) => {
                if let Err(e) = queue.publish(DEAD_LETTER_QUEUE, &payload).await {
                    error!(video_id = %request.video_id, error = %e, "Failed to dead-letter job");
                }
            }
            Err(e) => error!(error = %e, "Failed to encode dead letter"),
        }
    }

    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        error!(error = %e, "Failed to ack message");
    }
}

/// Submit until the job succeeds, fails permanently, or runs out of attempts.
async fn run_with_retry(state: &AppState, request: &TranscodeRequest) -> (Result<JobResult, JobError>, u32) {
    let max_attempts = state.config.job_max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = TranscodeService::submit(state.clone(), request.clone()).await;
        let retryable = match &outcome {
            Ok(result) => result.is_retryable(),
            Err(e) => e.is_retryable(),
        };

        if !retryable || attempt >= max_attempts {
            return (outcome, attempt);
        }

        let delay = backoff(attempt);
        warn!(
            video_id = %request.video_id,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::transcode::testing::test_app;

    #[test]
    fn backoff_doubles_from_one_second() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(4));
        assert_eq!(backoff(40), Duration::from_secs(64));
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let app = test_app(&["v1"]);
        let request = TranscodeRequest {
            video_id: "v1".to_string(),
            source_key: "uploads/v1/gone.mp4".to_string(),
            force: false,
        };

        let (outcome, attempts) = run_with_retry(&app.state, &request).await;

        assert_eq!(attempts, 1);
        assert!(!outcome.unwrap().ok);
    }

    #[tokio::test(start_paused = true)]
    async fn held_lock_is_retried_until_attempts_run_out() {
        let app = test_app(&["v1"]);
        app.locks.hold("v1");
        let request = TranscodeRequest {
            video_id: "v1".to_string(),
            source_key: "uploads/v1/raw.mp4".to_string(),
            force: false,
        };

        let (outcome, attempts) = run_with_retry(&app.state, &request).await;

        assert_eq!(attempts, app.state.config.job_max_attempts);
        assert!(matches!(outcome, Err(JobError::InFlight(_))));
    }

    #[test]
    fn dead_letter_keeps_the_original_request() {
        let request = TranscodeRequest {
            video_id: "v1".to_string(),
            source_key: "uploads/v1/raw.mp4".to_string(),
            force: false,
        };
        let letter = DeadLetter {
            request: &request,
            code: "ENCODING",
            error: "adaptive package pass exited with code 1",
            attempts: 1,
        };
        let json = serde_json::to_value(&letter).unwrap();
        assert_eq!(json["request"]["videoId"], "v1");
        assert_eq!(json["code"], "ENCODING");
    }
}
