//! Shared server state and pipeline wiring.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use mediaferry::{
    DeliveryPipeline, EventBus, Extractor, HttpObjectStore, Orchestrator, WebhookNotifier,
    YtDlpExtractor,
};

use crate::config::Settings;

const EVENT_BUS_CAPACITY: usize = 1024;

/// Shared across all handlers via axum `State`.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// `None` rejects every submission.
    pub api_secret: Option<String>,
    pub proxy_configured: bool,
    pub started_at: Instant,
    /// Cancelled on shutdown; ends open event streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        api_secret: Option<String>,
        proxy_configured: bool,
    ) -> Self {
        Self {
            orchestrator,
            api_secret,
            proxy_configured,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let orchestrator = build_orchestrator(settings)?;
        Ok(Self::new(
            Arc::new(orchestrator),
            settings.api_secret.clone().filter(|s| !s.is_empty()),
            settings.proxy_configured(),
        ))
    }

    /// Constant-time comparison against the configured secret.
    pub fn authorized(&self, presented: Option<&str>) -> bool {
        match (&self.api_secret, presented) {
            (Some(expected), Some(got)) => constant_time_eq(expected.as_bytes(), got.as_bytes()),
            _ => false,
        }
    }

    /// Stop accepting work: running jobs are cancelled and event streams end.
    pub fn begin_shutdown(&self) {
        self.orchestrator.shutdown();
        self.shutdown.cancel();
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Wire the production collaborators from settings.
pub fn build_orchestrator(settings: &Settings) -> anyhow::Result<Orchestrator> {
    let pipeline = settings.pipeline_config()?;
    let storage = settings.storage_config()?;
    let catalog = settings.catalog()?;

    let extractor = YtDlpExtractor::new(settings.extractor_config());
    if !extractor.is_available() {
        tracing::warn!(binary = %extractor.binary().display(), "extraction tool not found; every job will fail");
    }
    let extractor: Arc<dyn Extractor> = Arc::new(extractor);
    let notifier = WebhookNotifier::new(settings.notifier_config())?;

    tracing::info!(
        strategies = catalog.len(),
        max_attempts = pipeline.max_attempts,
        max_jobs = pipeline.max_concurrent_jobs,
        storage = %storage.base_url,
        "pipeline configured"
    );

    Ok(Orchestrator::new(
        pipeline,
        Arc::new(catalog),
        extractor,
        DeliveryPipeline::new(Arc::new(HttpObjectStore::new(storage))),
        Arc::new(notifier),
        EventBus::new(EVENT_BUS_CAPACITY),
    ))
}
