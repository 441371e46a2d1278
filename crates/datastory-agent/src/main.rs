//! Datastory: question-driven data stories over uploaded CSV datasets.
//! Entry point for the server binary.

mod config;

use std::sync::Arc;

use datastory_agents::Scheduler;
use datastory_common::SandboxPolicy;
use datastory_llm::{LlmBackend, OpenAiCompatibleBackend};
use datastory_sandbox::{CodeExecutor, FigureStore, PythonExecutor};
use datastory_storage::{DatasetCatalog, InMemoryMetadataStore, LocalObjectStore};
use datastory_web::{build_router, AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn build_llm(config: &config::Config) -> anyhow::Result<Arc<dyn LlmBackend>> {
    let api_key = config.llm.resolve_api_key(std::env::var(config::API_KEY_ENV).ok());
    if api_key.is_none() {
        warn!("No LLM API key configured (set llm.api_key or {})", config::API_KEY_ENV);
    }
    let backend = OpenAiCompatibleBackend::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        api_key,
        config.llm.timeout(),
    )?;
    Ok(Arc::new(backend))
}

fn build_executor(config: &config::Config) -> Arc<dyn CodeExecutor> {
    let mut policy = SandboxPolicy::new().with_timeout(std::time::Duration::from_secs(config.sandbox.timeout_secs));
    for module in &config.sandbox.extra_modules {
        policy.allow_module(module);
    }
    Arc::new(PythonExecutor::new(&config.sandbox.python, policy))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DATASTORY_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("datastory=debug,info")),
        )
        .init();

    info!("Datastory starting up, version {}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load()?;
    info!(
        model = %config.llm.model,
        base_url = %config.llm.base_url,
        python = %config.sandbox.python.display(),
        "Configuration loaded"
    );

    let llm = build_llm(&config)?;
    let executor = build_executor(&config);

    tokio::fs::create_dir_all(&config.sandbox.figures_dir).await?;
    let figures = FigureStore::new(&config.sandbox.figures_dir);

    let objects = LocalObjectStore::new(&config.storage.root);
    let catalog = DatasetCatalog::new(Arc::new(objects), Arc::new(InMemoryMetadataStore::new()))
        .with_sample_rows(config.pipeline.sample_rows);
    info!(root = %config.storage.root.display(), "Dataset storage ready");

    // One scheduler for the lifetime of the process.
    let scheduler = Arc::new(Scheduler::standard(llm, executor, figures.clone()));

    let state = AppState::new(scheduler, catalog, figures)
        .with_max_upload_bytes(config.server.max_upload_mb * 1024 * 1024);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Listening on http://{}", config.server.bind);
    info!("   Analyze:  POST /api/analyze");
    info!("   Datasets: /api/datasets");

    axum::serve(listener, router).await?;
    Ok(())
}
