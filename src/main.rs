// Main entry point - Dependency injection and server setup
use std::sync::Arc;
use anyhow::Context;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sjvair_monitor_pipeline::application::backend::DirectBackend;
use sjvair_monitor_pipeline::application::monitor_service::MonitorDataService;
use sjvair_monitor_pipeline::infrastructure::background_client::BackgroundServiceClient;
use sjvair_monitor_pipeline::infrastructure::config::load_settings;
use sjvair_monitor_pipeline::infrastructure::dispatched_backend::{monitors_background_service, DispatchedBackend};
use sjvair_monitor_pipeline::infrastructure::http_api::HttpMonitorsApi;
use sjvair_monitor_pipeline::presentation::app_state::AppState;
use sjvair_monitor_pipeline::presentation::handlers::{
    health_check, list_markers, list_subscriptions, monitor_chart, monitor_subscriptions,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let settings = load_settings()?;
    let classifier = settings.display.classifier()?;

    // REST client (infrastructure layer)
    let api = Arc::new(HttpMonitorsApi::new(&settings.api.base_url, settings.api.request_timeout())?);

    // The pipeline runs on the background service; the main context only talks to it through messages
    let direct = Arc::new(DirectBackend::new(api.clone(), settings.api.max_pages));
    let background = monitors_background_service(direct);
    tracing::info!(service = background.name(), "Spawning background service");
    let channel = background.spawn();
    let backend = Arc::new(DispatchedBackend::new(BackgroundServiceClient::new(channel)));

    // Create services (application layer)
    let monitor_service = Arc::new(MonitorDataService::new(
        classifier,
        settings.visibility.clone(),
        backend,
        api,
    ));

    if let Err(e) = monitor_service.load_monitors().await {
        tracing::error!("Initial monitor load failed: {:#}", e);
    }

    if let Some(interval) = settings.server.refresh_interval() {
        let service = monitor_service.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = service.load_monitors().await {
                    tracing::error!("Monitor refresh failed: {:#}", e);
                }
            }
        });
    }

    // Create application state
    let state = Arc::new(AppState { monitor_service });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/markers", get(list_markers))
        .route("/monitors/:id/chart", get(monitor_chart))
        .route("/monitors/:id/subscriptions", get(monitor_subscriptions))
        .route("/subscriptions", get(list_subscriptions))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = settings.server.bind;
    tracing::info!("Starting sjvair-monitor-pipeline on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router).await?;

    Ok(())
}
