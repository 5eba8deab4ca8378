use sqlx::PgPool;
use uuid::Uuid;

use super::model::{JobRow, JobStage, PublishedUrls, VideoStatusRow};

pub const PUBLISHED_STATUS: &str = "PUBLISHED";

pub struct VideoRepository;

impl VideoRepository {
    /// Flip the video row to published. Returns the number of rows touched.
    pub async fn mark_published(
        pool: &PgPool,
        video_id: Uuid,
        urls: &PublishedUrls,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET status = $1, hls_master_url = $2, thumb_url = $3
            WHERE id = $4
            "#,
        )
        .bind(PUBLISHED_STATUS)
        .bind(&urls.hls_master_url)
        .bind(&urls.thumb_url)
        .bind(video_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find_status(pool: &PgPool, video_id: Uuid) -> Result<Option<VideoStatusRow>, sqlx::Error> {
        sqlx::query_as::<_, VideoStatusRow>(
            r#"
            SELECT status, hls_master_url, thumb_url
            FROM videos
            WHERE id = $1
            "#,
        )
        .bind(video_id)
        .fetch_optional(pool)
        .await
    }
}

pub struct JobRepository;

impl JobRepository {
    pub async fn find(pool: &PgPool, video_id: &str) -> Result<Option<JobRow>, sqlx::Error> {
        sqlx::query_as::<_, JobRow>(
            r#"
            SELECT video_id, source_key, stage, hls_master_url, thumb_url,
                   error_code, error, attempts, created_at, updated_at
            FROM transcode_jobs
            WHERE video_id = $1
            "#,
        )
        .bind(video_id)
        .fetch_optional(pool)
        .await
    }

    /// Start a fresh attempt, discarding URLs and errors of earlier ones.
    pub async fn begin(pool: &PgPool, video_id: &str, source_key: &str) -> Result<JobRow, sqlx::Error> {
        sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO transcode_jobs (video_id, source_key, stage, attempts)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (video_id) DO UPDATE
            SET source_key = EXCLUDED.source_key,
                stage = EXCLUDED.stage,
                hls_master_url = NULL,
                thumb_url = NULL,
                error_code = NULL,
                error = NULL,
                attempts = transcode_jobs.attempts + 1,
                updated_at = NOW()
            RETURNING video_id, source_key, stage, hls_master_url, thumb_url,
                      error_code, error, attempts, created_at, updated_at
            "#,
        )
        .bind(video_id)
        .bind(source_key)
        .bind(JobStage::Started.as_str())
        .fetch_one(pool)
        .await
    }

    /// Count another attempt on an existing entry without touching its checkpoint.
    pub async fn resume(pool: &PgPool, video_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET attempts = attempts + 1, error_code = NULL, error = NULL, updated_at = NOW()
            WHERE video_id = $1
            "#,
        )
        .bind(video_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn checkpoint(
        pool: &PgPool,
        video_id: &str,
        stage: JobStage,
        urls: Option<&PublishedUrls>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET stage = $1,
                hls_master_url = COALESCE($2, hls_master_url),
                thumb_url = COALESCE($3, thumb_url),
                updated_at = NOW()
            WHERE video_id = $4
            "#,
        )
        .bind(stage.as_str())
        .bind(urls.map(|u| u.hls_master_url.as_str()))
        .bind(urls.map(|u| u.thumb_url.as_str()))
        .bind(video_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record a failed attempt. A `PLACED` checkpoint is kept so the next
    /// attempt only has to re-drive the status update.
    pub async fn fail(
        pool: &PgPool,
        video_id: &str,
        error_code: &str,
        error: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET stage = CASE WHEN stage = $1 THEN stage ELSE $2 END,
                error_code = $3,
                error = $4,
                updated_at = NOW()
            WHERE video_id = $5
            "#,
        )
        .bind(JobStage::Placed.as_str())
        .bind(JobStage::Failed.as_str())
        .bind(error_code)
        .bind(error)
        .bind(video_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
