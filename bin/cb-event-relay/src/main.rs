//! CellBase Event Relay
//!
//! Subscribes to the cell event topic and writes every received event
//! through the per-cell leveled logger. Its own run status is kept in the
//! progress store.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CB_CONFIG` | - | Path to the TOML configuration file |
//! | `CB_RELAY_CELL` | `relay` | Cell identity used as the log prefix |
//! | `CB_RELAY_TOPIC` | `event_bus.topic_all` | Topic to tail |
//! | `RUST_LOG` | `info` | Log level |
//!
//! All `CB_*` configuration overrides from `cb-config` apply as well.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cb_bus::{EventBus, EventSubscriber};
use cb_cache::{ProgressInfo, ProgressStore};
use cb_common::CodedError;
use cb_config::AppConfig;
use cb_event::{validate_event, EventLogger, Level};

const IDLE_BACKOFF: Duration = Duration::from_millis(500);

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Starting CellBase Event Relay");

    let config_path = std::env::var("CB_CONFIG").ok().map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    let cell_id = env_or("CB_RELAY_CELL", "relay");
    let topic = env_or("CB_RELAY_TOPIC", &config.event_bus.topic_all);

    let threshold: Level = match config.event.log_level.parse() {
        Ok(level) => level,
        Err(_) => {
            warn!(level = %config.event.log_level, "Unknown event log level, using INFO");
            Level::Info
        }
    };
    let logger = EventLogger::new(cell_id.clone(), threshold);

    let cache = cb_cache::connect(&config.cache).await?;
    let progress = ProgressStore::new(cache, &config.progress);
    let progress_key = format!("relay-{}", cell_id);

    let bus = EventBus::from_config(&config.event_bus)?;
    let Some(subscriber) = bus.create_subscriber() else {
        info!("Event bus not configured, nothing to relay");
        return Ok(());
    };
    subscriber.subscribe(&topic).await?;
    info!(topic = %topic, cell = %cell_id, "Relaying events");

    let mut status = ProgressInfo::new("relay", cell_id.clone(), None);
    status.set_processing(0);
    progress.put_progress(&status.to_progress(&progress_key)).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = tokio::spawn(relay_loop(
        subscriber.clone(),
        logger,
        config.event.max_value_length,
        shutdown_rx,
    ));

    shutdown_signal().await;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    subscriber.unsubscribe().await?;

    let relayed = relay.await?;
    info!(relayed, "Event relay stopped");

    status.complete();
    progress.put_progress(&status.to_progress(&progress_key)).await;
    Ok(())
}

async fn relay_loop(
    subscriber: Arc<dyn EventSubscriber>,
    logger: EventLogger,
    max_value_length: usize,
    shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut relayed = 0u64;
    while !*shutdown.borrow() {
        let Some(batch) = subscriber.receive().await else {
            // broker trouble or interruption; back off before polling again
            tokio::time::sleep(IDLE_BACKOFF).await;
            continue;
        };
        for event in &batch {
            if let Err(e) = validate_event(event, max_value_length) {
                warn!(code = e.code(), error = %e, "Dropping invalid event");
                continue;
            }
            if logger.log(event) {
                relayed += 1;
            }
        }
    }
    relayed
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
