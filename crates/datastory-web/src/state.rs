//! Shared application state for the web server.

use std::sync::Arc;

use datastory_agents::Scheduler;
use datastory_sandbox::FigureStore;
use datastory_storage::DatasetCatalog;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Built once at startup; every analyze request runs through it.
    pub scheduler: Arc<Scheduler>,
    pub catalog: DatasetCatalog,
    pub figures: FigureStore,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, catalog: DatasetCatalog, figures: FigureStore) -> Self {
        Self { scheduler, catalog, figures, max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES }
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}

pub type SharedState = Arc<AppState>;
