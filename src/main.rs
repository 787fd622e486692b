//! Print Watchdog - 3D print monitoring service
//!
//! Main entry point.

use print_watchdog::{
    ai_client::GeminiClient,
    camera_gateway::RpicamBackend,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "print_watchdog=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Print Watchdog v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        ai_config = %config.ai_config_path.display(),
        history_dir = %config.history_dir.display(),
        camera_command = %config.camera_command,
        alerts = config.discord_webhook_url.is_some(),
        "Configuration loaded"
    );

    let backend = Arc::new(RpicamBackend::new(config.camera_command.clone()));
    let analyzer = Arc::new(GeminiClient::new(
        config.gemini_api_url.clone(),
        config.gemini_api_key.clone(),
    )?);

    let state = AppState::build(config, backend, analyzer).await?;
    tracing::info!("Components initialized");

    // Live feed
    state.preview.start().await;

    let mut app = web_api::create_router(state.clone());
    if let Some(static_dir) = state.config.static_dir.clone() {
        let serve_dir =
            ServeDir::new(&static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));
        app = app.fallback_service(serve_dir);
        tracing::info!(static_dir = %static_dir.display(), "Static file serving enabled");
    }
    let app = app
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

/// Wait for ctrl-c, then stop monitoring and the live feed
async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }

    tracing::info!("Shutdown requested");
    if let Err(e) = state.monitoring.stop().await {
        tracing::warn!(error = %e, "Failed to stop monitoring");
    }
    state.preview.stop().await;
}
