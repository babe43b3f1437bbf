// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use axum::{
    Router,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::alert_evaluator::AlertEvaluator;
use crate::application::backoff::ReconnectPolicy;
use crate::application::event_bus::EventBus;
use crate::application::history_service::{HistoryCache, HistoryService};
use crate::application::monitor::Monitor;
use crate::application::polling::PollingLoop;
use crate::application::push_transport::PushTransport;
use crate::application::state_store::StateStore;
use crate::infrastructure::config::load_monitor_config;
use crate::infrastructure::credentials::Credentials;
use crate::infrastructure::history_cache::MemoryHistoryCache;
use crate::infrastructure::http_repository::HttpTelemetryRepository;
use crate::infrastructure::ws_connector::WsPushConnector;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    get_alerts, get_connection, get_history, get_polling_metrics, get_state, health_check,
    push_send, resolve_alert, set_token, stream_events,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_monitor_config()?;
    if config.api.token.is_none() {
        tracing::warn!("No API token configured, polling and history requests will fail");
    }

    // Shared state (composition root owns the single instances)
    let bus = EventBus::new();
    let store = Arc::new(StateStore::new());
    let credentials = Credentials::new(config.api.token.clone());
    let evaluator = Arc::new(AlertEvaluator::new(
        config.thresholds.clone(),
        config.alerts.history_capacity,
        bus.clone(),
    ));

    // Infrastructure adapters
    let repository = Arc::new(HttpTelemetryRepository::new(
        &config.api.base_url,
        &config.api.latest_path,
        &config.api.history_path,
        config.api.request_timeout(),
    )?);

    // Application services
    let polling = Arc::new(PollingLoop::new(
        repository.clone(),
        credentials.clone(),
        store.clone(),
        evaluator.clone(),
        bus.clone(),
        config.motors.clone(),
        config.api.request_timeout(),
        config.polling.failure_threshold,
    ));

    let push = config.push.enabled.then(|| {
        let connector = Arc::new(WsPushConnector::new(&config.push.url, credentials.clone()));
        let policy = ReconnectPolicy::new(
            Duration::from_millis(config.push.base_delay_ms),
            config.push.backoff_factor,
            config.push.max_retries,
        );
        PushTransport::new(connector, policy, store.clone(), evaluator.clone(), bus.clone())
    });

    let cache = config.history.cache_enabled.then(|| {
        Arc::new(MemoryHistoryCache::new(Duration::from_secs(config.history.cache_ttl_secs)))
            as Arc<dyn HistoryCache>
    });
    let history = HistoryService::new(
        repository,
        credentials.clone(),
        cache,
        config.history.max_chart_points,
    );

    let monitor = Monitor::new(
        store.clone(),
        bus.clone(),
        polling,
        push,
        config.thresholds.clone(),
        config.polling.clone(),
    );
    monitor.start();

    let state = Arc::new(AppState {
        store,
        evaluator,
        history,
        monitor: monitor.clone(),
        bus,
        credentials,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/api/state", get(get_state))
        .route("/api/connection", get(get_connection))
        .route("/api/auth/token", post(set_token))
        .route("/api/alerts", get(get_alerts))
        .route("/api/alerts/:id/resolve", post(resolve_alert))
        .route("/api/history", get(get_history))
        .route("/api/polling/metrics", get(get_polling_metrics))
        .route("/api/push/send", post(push_send))
        .route("/api/events", get(stream_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting motor-monitor service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.stop();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown requested");
}
