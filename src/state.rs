use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::modules::transcode::ledger::JobLedger;
use crate::modules::transcode::lock::JobLock;
use crate::modules::transcode::orchestrator::TranscodeOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<TranscodeOrchestrator>,
    pub ledger: Arc<dyn JobLedger>,
    pub locks: Arc<dyn JobLock>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        orchestrator: Arc<TranscodeOrchestrator>,
        ledger: Arc<dyn JobLedger>,
        locks: Arc<dyn JobLock>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            ledger,
            locks,
        }
    }
}
