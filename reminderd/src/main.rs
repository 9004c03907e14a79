mod alarm;
mod api;
mod config;
mod engine;
mod schedule;
mod store;
mod store_manager;

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::alarm::{AlarmRegistry, NotificationBoard, TokioTimer, TriggerDispatcher};
use crate::config::Config;
use crate::engine::ReminderEngine;
use crate::schedule::ScheduleCalculator;
use crate::store::db::MedicationDb;
use crate::store_manager::StoreHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reminderd=info"))
        )
        .init();

    tracing::info!("Starting reminderd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/medication-reminder/reminderd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Open SQLite database
    let db = MedicationDb::open(&config.store.db_path)?;
    tracing::info!("Opened database at {:?}", config.store.db_path);

    let initial_hash = store::hash::compute_hash(&db.load_all()?);
    let (hash_tx, hash_rx) = watch::channel(initial_hash);

    let store = StoreHandle::spawn(db, hash_tx);

    // Timer facility, registry and the dispatcher that drains fires
    let (fire_tx, fire_rx) = mpsc::channel(256);
    let timer = Arc::new(TokioTimer::new(
        tokio::runtime::Handle::current(),
        fire_tx,
        config.timer.max_alarms,
    ));
    let registry = Arc::new(AlarmRegistry::new(timer.clone()));
    let board = Arc::new(NotificationBoard::new());
    let dispatcher = Arc::new(TriggerDispatcher::new(registry.clone(), board.clone()));

    let engine = Arc::new(ReminderEngine::new(
        store.clone(),
        registry,
        ScheduleCalculator::new(config.schedule.timezone),
    ));

    // Re-arm everything that was scheduled before the last shutdown
    engine.restore().await.context("Failed to restore reminders")?;
    tracing::info!("{} alarms armed after restore", timer.armed_count());

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let dispatch_cancel = cancel.clone();
    let dispatch_handle = tokio::spawn(async move {
        if let Err(e) = alarm::dispatcher::run(dispatcher, fire_rx, dispatch_cancel).await {
            tracing::error!("Dispatcher error: {}", e);
        }
    });

    let app = api::routes::router(api::routes::AppState {
        engine,
        board,
        hash_rx,
    });

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    let _ = tokio::join!(dispatch_handle, server_handle);

    if let Err(e) = store.shutdown().await {
        tracing::error!("Failed to shutdown store: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
