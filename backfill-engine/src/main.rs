use anyhow::Context;
use backfill_core::SystemClock;
use backfill_engine::{Adapters, Engine};
use backfill_store::app_config::Config;
use backfill_store::LoggingProvider;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backfill_engine=debug,backfill_confirm=info,backfill_waitlist=info,backfill_notify=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(
        window_hours = config.confirmation.window_hours,
        max_attempts = config.notifications.max_attempts,
        "Starting backfill engine"
    );

    let adapters = Adapters::in_memory(Arc::new(LoggingProvider), Arc::new(SystemClock));
    let engine = Engine::new(&config, adapters).context("Failed to build engine")?;

    // Event log
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!(salon_id = ?event.salon_id(), event = %json, "Engine event"),
                    Err(e) => tracing::error!("Failed to encode event: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_scheduler(shutdown_rx).await })
    };

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    shutdown_tx.send(true).context("Scheduler already stopped")?;
    scheduler.await.context("Scheduler task panicked")?;

    match engine.metrics().render() {
        Ok(text) => tracing::debug!("Final metrics:\n{}", text),
        Err(e) => tracing::warn!("Failed to render metrics: {}", e),
    }
    Ok(())
}
