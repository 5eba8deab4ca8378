use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::settings::{AppConfig, PublishMode};
use crate::infrastructure::db::pool::{connect_to_db, run_migrations};
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::redis::client::RedisService;
use crate::infrastructure::storage::ObjectStore;
use crate::infrastructure::storage::local::LocalDirStore;
use crate::infrastructure::storage::s3::StorageService;
use crate::modules::transcode::encoder::{EncodeProfile, EncodingInvoker, FfmpegEngine};
use crate::modules::transcode::ledger::{JobLedger, PgJobLedger};
use crate::modules::transcode::orchestrator::TranscodeOrchestrator;
use crate::modules::transcode::recorder::{PgVideoStore, StatusRecorder};
use crate::modules::transcode::transfer::ArtifactTransfer;
use crate::modules::transcode::workspace::WorkspaceManager;
use crate::state::AppState;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting transcoder...");

    let config = AppConfig::new()?;
    config.validate()?;

    let db = connect_to_db(&config.database_url).await?;
    run_migrations(&db).await?;

    let redis = RedisService::new(&config.redis_url).await?;

    let storage = Arc::new(StorageService::new(
        &config.r2_endpoint,
        &config.r2_region,
        &config.r2_bucket,
        &config.r2_access_key,
        &config.r2_secret_key,
    ));

    let destination: Arc<dyn ObjectStore> = match config.publish_mode {
        PublishMode::Upload => storage.clone() as Arc<dyn ObjectStore>,
        PublishMode::Served => {
            let serve_root = config
                .serve_root
                .clone()
                .context("SERVE_ROOT is required in served mode")?;
            Arc::new(LocalDirStore::new(serve_root))
        }
    };
    info!(publish_mode = ?config.publish_mode, "Artifact destination configured");

    let ledger: Arc<dyn JobLedger> = Arc::new(PgJobLedger::new(db.clone()));

    let orchestrator = TranscodeOrchestrator::new(
        WorkspaceManager::new(&config.work_root),
        ArtifactTransfer::new(storage, destination, &config.public_video_base_url),
        EncodingInvoker::new(
            Arc::new(FfmpegEngine::new(&config.ffmpeg_path)),
            EncodeProfile::default(),
        ),
        StatusRecorder::new(Arc::new(PgVideoStore::new(db))),
        ledger.clone(),
    );

    let state = AppState::new(config.clone(), Arc::new(orchestrator), ledger, Arc::new(redis));

    if let Some(url) = &config.rabbitmq_url {
        let queue = RabbitMqService::new(url).await?;
        let worker_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = workers::transcoder::start_transcoder_worker(worker_state, queue).await {
                error!(error = %e, "Transcoder Worker stopped");
            }
        });
    }

    let app = app::create_app(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
