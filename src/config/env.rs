use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RedisUrl,
    RabbitMqUrl,
    R2Endpoint,
    R2Region,
    R2Bucket,
    R2AccessKey,
    R2SecretKey,
    PublicVideoBaseUrl,
    WorkRoot,
    FfmpegPath,
    PublishMode,
    ServeRoot,
    JobLockTtlSecs,
    JobMaxAttempts,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::R2Endpoint => "R2_ENDPOINT",
            EnvKey::R2Region => "R2_REGION",
            EnvKey::R2Bucket => "R2_BUCKET",
            EnvKey::R2AccessKey => "R2_ACCESS_KEY",
            EnvKey::R2SecretKey => "R2_SECRET_KEY",
            EnvKey::PublicVideoBaseUrl => "PUBLIC_VIDEO_BASE_URL",
            EnvKey::WorkRoot => "WORK_ROOT",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::PublishMode => "PUBLISH_MODE",
            EnvKey::ServeRoot => "SERVE_ROOT",
            EnvKey::JobLockTtlSecs => "JOB_LOCK_TTL_SECS",
            EnvKey::JobMaxAttempts => "JOB_MAX_ATTEMPTS",
        }
    }
}

/// Unset and blank values are both treated as absent.
pub fn get_optional(key: EnvKey) -> Option<String> {
    env::var(key.as_str())
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    get_optional(key).unwrap_or_else(|| default.to_string())
}

/// `default` when unset. A value that does not parse is returned as `Err`.
pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> Result<T, String> {
    match get_optional(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| raw),
        None => Ok(default),
    }
}
