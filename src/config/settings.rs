use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::env::{self, EnvKey};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where encoded artifacts are placed before the video is marked published.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    /// PUT every artifact to the object store under `videos/{id}/`.
    Upload,
    /// Copy artifacts into a local directory that is synced or served at the public base.
    Served,
}

impl FromStr for PublishMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(PublishMode::Upload),
            "served" => Ok(PublishMode::Served),
            other => Err(ConfigError::Invalid {
                key: EnvKey::PublishMode.as_str(),
                reason: format!("expected 'upload' or 'served', got '{}'", other),
            }),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub rabbitmq_url: Option<String>,
    pub r2_endpoint: String,
    pub r2_region: String,
    pub r2_bucket: String,
    pub r2_access_key: String,
    pub r2_secret_key: String,
    pub public_video_base_url: String,
    pub work_root: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub publish_mode: PublishMode,
    pub serve_root: Option<PathBuf>,
    pub job_lock_ttl_secs: u64,
    pub job_max_attempts: u32,
}

fn required(key: EnvKey) -> Result<String, ConfigError> {
    let name = key.as_str();
    env::get_optional(key).ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(key: EnvKey, default: T) -> Result<T, ConfigError> {
    let name = key.as_str();
    env::get_parsed(key, default).map_err(|raw| ConfigError::Invalid {
        key: name,
        reason: format!("cannot parse '{}'", raw),
    })
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let publish_mode = match env::get_optional(EnvKey::PublishMode) {
            Some(raw) => raw.parse()?,
            None => PublishMode::Upload,
        };

        Ok(Self {
            server_port: parsed(EnvKey::ServerPort, 8080)?,
            database_url: required(EnvKey::DatabaseUrl)?,
            redis_url: required(EnvKey::RedisUrl)?,
            rabbitmq_url: env::get_optional(EnvKey::RabbitMqUrl),
            r2_endpoint: required(EnvKey::R2Endpoint)?,
            r2_region: env::get_or(EnvKey::R2Region, "auto"),
            r2_bucket: required(EnvKey::R2Bucket)?,
            r2_access_key: required(EnvKey::R2AccessKey)?,
            r2_secret_key: required(EnvKey::R2SecretKey)?,
            public_video_base_url: required(EnvKey::PublicVideoBaseUrl)?
                .trim_end_matches('/')
                .to_string(),
            work_root: env::get_optional(EnvKey::WorkRoot)
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("transcoder")),
            ffmpeg_path: PathBuf::from(env::get_or(EnvKey::FfmpegPath, "ffmpeg")),
            publish_mode,
            serve_root: env::get_optional(EnvKey::ServeRoot).map(PathBuf::from),
            job_lock_ttl_secs: parsed(EnvKey::JobLockTtlSecs, 3600)?,
            job_max_attempts: parsed(EnvKey::JobMaxAttempts, 3)?,
        })
    }

    /// Checks cross-field constraints. Called once at startup so a bad
    /// deployment fails before it accepts any job.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = Url::parse(&self.public_video_base_url).map_err(|e| ConfigError::Invalid {
            key: EnvKey::PublicVideoBaseUrl.as_str(),
            reason: e.to_string(),
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(ConfigError::Invalid {
                key: EnvKey::PublicVideoBaseUrl.as_str(),
                reason: format!("unsupported scheme '{}'", base.scheme()),
            });
        }

        Url::parse(&self.r2_endpoint).map_err(|e| ConfigError::Invalid {
            key: EnvKey::R2Endpoint.as_str(),
            reason: e.to_string(),
        })?;

        if !self.work_root.is_absolute() {
            return Err(ConfigError::Invalid {
                key: EnvKey::WorkRoot.as_str(),
                reason: "must be an absolute path".to_string(),
            });
        }

        if self.publish_mode == PublishMode::Served && self.serve_root.is_none() {
            return Err(ConfigError::Missing(EnvKey::ServeRoot.as_str()));
        }

        if self.job_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: EnvKey::JobMaxAttempts.as_str(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.job_lock_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: EnvKey::JobLockTtlSecs.as_str(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    pub fn job_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.job_lock_ttl_secs)
    }
}
