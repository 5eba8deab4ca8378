//! At most one in-flight job per video.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::error::JobError;
use crate::infrastructure::redis::client::RedisService;

pub fn lock_key(video_id: &str) -> String {
    format!("transcode:lock:{}", video_id)
}

#[async_trait]
pub trait JobLock: Send + Sync {
    /// Take the lock for `video_id`. `None` means another job holds it.
    async fn acquire(&self, video_id: &str, ttl: Duration) -> Result<Option<String>, JobError>;

    /// Release a lock taken with `token`. Releasing an expired or foreign lock is a no-op.
    async fn release(&self, video_id: &str, token: &str) -> Result<(), JobError>;
}

#[async_trait]
impl JobLock for RedisService {
    async fn acquire(&self, video_id: &str, ttl: Duration) -> Result<Option<String>, JobError> {
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .set_lock(&lock_key(video_id), &token, ttl)
            .await
            .map_err(|e| JobError::Lock(e.to_string()))?;
        Ok(acquired.then_some(token))
    }

    async fn release(&self, video_id: &str, token: &str) -> Result<(), JobError> {
        self.release_lock(&lock_key(video_id), token)
            .await
            .map_err(|e| JobError::Lock(e.to_string()))?;
        Ok(())
    }
}
