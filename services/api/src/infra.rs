use inscrisup::admissions::{JsonFileRepository, PushService, ReconciliationEngine};
use inscrisup::config::AdmissionsConfig;
use inscrisup::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Shared pieces every command works with: the ledger file and the engine.
pub(crate) struct Runtime {
    pub(crate) repository: Arc<JsonFileRepository>,
    pub(crate) engine: Arc<ReconciliationEngine>,
    pub(crate) source_dir: PathBuf,
}

impl Runtime {
    pub(crate) fn open(config: &AdmissionsConfig) -> Result<Self, AppError> {
        let repository = Arc::new(JsonFileRepository::open(&config.store_path)?);
        let engine = Arc::new(ReconciliationEngine::new(
            config.classes.clone(),
            config.boarding_guard,
        ));

        Ok(Self {
            repository,
            engine,
            source_dir: config.source_dir.clone(),
        })
    }

    pub(crate) fn push_service(
        &self,
        config: &AdmissionsConfig,
    ) -> Arc<PushService<JsonFileRepository>> {
        Arc::new(PushService::new(
            self.repository.clone(),
            self.engine.clone(),
            config.push_credentials.clone(),
        ))
    }
}
