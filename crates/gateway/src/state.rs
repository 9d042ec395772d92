use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use bn_domain::config::Config;
use bn_engines::{ChatEngine, ToolClassifier};
use bn_sanitize::Filters;

use crate::report::ErrorReporter;
use crate::runtime::prefilter::ScreenshotFilter;

/// Shared application state injected into every session.
///
/// Everything here is constructed once at startup; there is no
/// module-level mutable state anywhere in the gateway.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Engines ───────────────────────────────────────────────────────
    pub chat: Arc<dyn ChatEngine>,
    /// `None` when no classifier endpoint is configured; tool decisions
    /// then come from the prefilter alone.
    pub tool: Option<Arc<dyn ToolClassifier>>,

    // ── Precompiled pattern sets ──────────────────────────────────────
    pub filters: Arc<Filters>,
    pub prefilter: Arc<ScreenshotFilter>,

    // ── Capacity & security ───────────────────────────────────────────
    /// Process-wide admission semaphore; one permit per live connection.
    pub admission: Arc<Semaphore>,
    /// SHA-256 of the shared API key (computed once at startup).
    /// `None` when the key is unset, which rejects every connection.
    pub api_key_hash: Option<Vec<u8>>,

    // ── Telemetry ─────────────────────────────────────────────────────
    pub reporter: Arc<ErrorReporter>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        chat: Arc<dyn ChatEngine>,
        tool: Option<Arc<dyn ToolClassifier>>,
    ) -> Self {
        let api_key_hash = if config.server.api_key.is_empty() {
            None
        } else {
            Some(Sha256::digest(config.server.api_key.as_bytes()).to_vec())
        };
        let admission = Arc::new(Semaphore::new(config.server.max_concurrent_connections));
        Self {
            config,
            chat,
            tool,
            filters: Arc::new(Filters::new()),
            prefilter: Arc::new(ScreenshotFilter::new()),
            admission,
            api_key_hash,
            reporter: Arc::new(ErrorReporter::new()),
        }
    }
}
