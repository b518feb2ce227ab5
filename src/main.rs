use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

mod config;
mod dashboard;
mod engine;
mod error;
mod leagues;
mod live_scores;
mod models;
mod store;

use config::Config;
use dashboard::AppState;
use engine::DisplayEngine;
use leagues::{spawn_config_watcher, EngineSettings};
use live_scores::{EspnProvider, FetchSupervisor, GameProvider};
use store::GameStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let settings = EngineSettings::load(&config.config)
        .await
        .with_context(|| format!("Failed to load league config {}", config.config.display()))?;
    if settings.enabled().next().is_none() {
        warn!("No league is enabled; the display will stay idle");
    }
    let (settings_tx, settings_rx) = watch::channel(Arc::new(settings));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let provider: Arc<dyn GameProvider> = Arc::new(EspnProvider::new(
        &config.provider_base_url,
        std::time::Duration::from_secs(config.http_timeout_secs),
        config.scoreboard_lookback_days,
        config.scoreboard_lookahead_days,
    )?);
    info!("Score provider: {} ({})", provider.name(), config.provider_base_url);

    let store = GameStore::new();

    // Without a watcher the sender is parked here so subscribers stay open.
    let (watcher, _settings_tx) = match config.reload_every() {
        Some(every) => (
            Some(spawn_config_watcher(
                config.config.clone(),
                every,
                settings_tx,
                shutdown_rx.clone(),
            )),
            None,
        ),
        None => {
            info!("League config hot reload disabled");
            (None, Some(settings_tx))
        }
    };

    let supervisor = FetchSupervisor::new(
        Arc::clone(&provider),
        store.clone(),
        config.retry_policy(),
        settings_rx.clone(),
    );
    let fetch_task = tokio::spawn(supervisor.run(shutdown_rx.clone(), config.shutdown_grace()));

    let initial = Arc::clone(&settings_rx.borrow());
    let engine = DisplayEngine::new(store.clone(), initial);
    let display = engine.handle();
    let engine_task = tokio::spawn(engine.run(config.tick(), settings_rx, shutdown_rx.clone()));

    // Start the dashboard HTTP server
    let app = dashboard::router(AppState {
        display,
        store,
    });
    let addr: SocketAddr = config
        .dashboard_addr
        .parse()
        .with_context(|| format!("Invalid dashboard address {}", config.dashboard_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Dashboard listening on http://{}", addr);

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    if let Err(e) = engine_task.await {
        warn!("Display engine task failed: {}", e);
    }
    if let Err(e) = fetch_task.await {
        warn!("Fetch supervisor task failed: {}", e);
    }
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }
    server.await?.context("Dashboard server error")?;

    info!("Bye");
    Ok(())
}
