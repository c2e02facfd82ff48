//! Main Entrypoint for the MOT Trainer API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading prompt templates and building the training backend.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use mot_api::{
    config::{Config, ConfigError},
    router::create_router,
    state::AppState,
};
use mot_core::{
    BackendSettings, Catalog, OpenAICompatibleBackend, Orchestrator, PromptTemplates, Provider,
    ScriptedBackend, SessionRegistry, TrainingBackend,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

fn build_backend(
    config: &Config,
    prompts: Arc<PromptTemplates>,
) -> anyhow::Result<Arc<dyn TrainingBackend>> {
    if config.provider == Provider::Scripted {
        warn!("Using the scripted backend; replies are canned.");
        return Ok(Arc::new(ScriptedBackend));
    }
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| ConfigError::MissingVar(format!("API key for '{}'", config.provider)))?;
    let settings = BackendSettings::new(config.provider, api_key)
        .with_model(config.chat_model.clone())
        .with_api_base(config.api_base.clone());
    let backend = OpenAICompatibleBackend::new(settings, prompts)
        .context("Failed to construct the training backend")?;
    Ok(Arc::new(backend))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let prompts = Arc::new(match &config.prompts_path {
        Some(path) => PromptTemplates::load_dir(path)?,
        None => PromptTemplates::default(),
    });
    let backend = build_backend(&config, prompts.clone())?;
    let orchestrator = Orchestrator::new(backend, prompts)
        .with_policy(config.stage_policy)
        .with_call_timeout(config.call_timeout);

    let app_state = Arc::new(AppState {
        catalog: Arc::new(Catalog::builtin()),
        registry: Arc::new(
            SessionRegistry::new(orchestrator).with_idle_limit(config.session_idle_limit),
        ),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        provider = %config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        timeout = ?config.call_timeout,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
