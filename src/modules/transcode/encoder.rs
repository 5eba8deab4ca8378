//! Drives the external encoding engine (ffmpeg).

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

use super::transfer::{MANIFEST_NAME, THUMBNAIL_NAME};

/// Lines of engine stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodePass {
    Package,
    Thumbnail,
}

impl fmt::Display for EncodePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodePass::Package => f.write_str("adaptive package"),
            EncodePass::Thumbnail => f.write_str("thumbnail"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to start encoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("{pass} pass exited with {}: {stderr}", describe_exit(.exit_code))]
    Failed {
        pass: EncodePass,
        exit_code: Option<i32>,
        stderr: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {}", c),
        None => "signal".to_string(),
    }
}

/// Exit information of one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineExit {
    pub code: Option<i32>,
    pub stderr: String,
}

impl EngineExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub trait EncodingEngine: Send + Sync {
    /// Run the engine to completion with `args`, from `working_dir`.
    async fn invoke(&self, args: &[String], working_dir: &Path) -> Result<EngineExit, EncodeError>;
}

pub struct FfmpegEngine {
    program: PathBuf,
}

impl FfmpegEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl EncodingEngine for FfmpegEngine {
    async fn invoke(&self, args: &[String], working_dir: &Path) -> Result<EngineExit, EncodeError> {
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(EncodeError::Spawn)?;

        Ok(EngineExit {
            code: output.status.code(),
            stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_LINES),
        })
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// Fixed encode parameters. Chosen for playback compatibility rather than quality.
#[derive(Debug, Clone)]
pub struct EncodeProfile {
    pub max_height: u32,
    pub video_codec: &'static str,
    pub preset: &'static str,
    pub profile: &'static str,
    pub level: &'static str,
    pub audio_codec: &'static str,
    pub audio_bitrate_kbps: u32,
    pub segment_seconds: u32,
    pub thumbnail_offset: Duration,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        Self {
            max_height: 720,
            video_codec: "h264",
            preset: "veryfast",
            profile: "baseline",
            level: "3.0",
            audio_codec: "aac",
            audio_bitrate_kbps: 128,
            segment_seconds: 6,
            thumbnail_offset: Duration::from_secs(3),
        }
    }
}

/// `HH:MM:SS` form of an offset, as accepted by `-ss`.
fn format_offset(offset: Duration) -> String {
    let secs = offset.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub struct EncodingInvoker {
    engine: Arc<dyn EncodingEngine>,
    profile: EncodeProfile,
}

impl EncodingInvoker {
    pub fn new(engine: Arc<dyn EncodingEngine>, profile: EncodeProfile) -> Self {
        Self { engine, profile }
    }

    pub fn package_args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        let p = &self.profile;
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-vf".to_string(),
            format!("scale=-2:{}", p.max_height),
            "-c:v".to_string(),
            p.video_codec.to_string(),
            "-preset".to_string(),
            p.preset.to_string(),
            "-profile:v".to_string(),
            p.profile.to_string(),
            "-level".to_string(),
            p.level.to_string(),
            "-c:a".to_string(),
            p.audio_codec.to_string(),
            "-b:a".to_string(),
            format!("{}k", p.audio_bitrate_kbps),
            "-hls_time".to_string(),
            p.segment_seconds.to_string(),
            "-hls_list_size".to_string(),
            "0".to_string(),
            "-hls_flags".to_string(),
            "independent_segments".to_string(),
            "-f".to_string(),
            "hls".to_string(),
            output_dir.join(MANIFEST_NAME).display().to_string(),
        ]
    }

    pub fn thumbnail_args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-ss".to_string(),
            format_offset(self.profile.thumbnail_offset),
            "-i".to_string(),
            input.display().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            output_dir.join(THUMBNAIL_NAME).display().to_string(),
        ]
    }

    /// Produce the HLS package and the thumbnail in `output_dir`. The passes
    /// run one after another; the thumbnail pass is skipped if packaging fails.
    pub async fn transcode(&self, input: &Path, output_dir: &Path) -> Result<(), EncodeError> {
        self.run_pass(EncodePass::Package, self.package_args(input, output_dir), output_dir)
            .await?;
        self.run_pass(EncodePass::Thumbnail, self.thumbnail_args(input, output_dir), output_dir)
            .await?;
        Ok(())
    }

    async fn run_pass(&self, pass: EncodePass, args: Vec<String>, working_dir: &Path) -> Result<(), EncodeError> {
        let start = std::time::Instant::now();
        info!(pass = %pass, "Starting encoder pass");

        let exit = self.engine.invoke(&args, working_dir).await?;
        if !exit.success() {
            error!(pass = %pass, exit_code = ?exit.code, stderr = %exit.stderr, "Encoder pass failed");
            return Err(EncodeError::Failed {
                pass,
                exit_code: exit.code,
                stderr: exit.stderr,
            });
        }

        info!(
            pass = %pass,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Encoder pass finished"
        );
        Ok(())
    }
}
