//! LogWarden server.
//!
//! Wires the full pipeline: Kafka consumer -> record decoder -> alert engine
//! -> state store / notifier, plus the HTTP control plane for rule
//! management.
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `LOGWARDEN_CONFIG` | Path to the TOML config file |
//! | `LOGWARDEN_*` | Per-field overrides (see lw-config) |
//! | `LOG_FORMAT` | `json` for JSON logs, anything else for text |
//! | `RUST_LOG` | Log level filter (default: info) |

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use lw_api::{api_router, ApiState};
use lw_common::rules::default_rules;
use lw_config::ConfigLoader;
use lw_consumer::{BatchLogConsumer, ConsumerTelemetry, KafkaLogConsumer, RecordProcessor};
use lw_engine::AlertEngine;
use lw_notifier::{NoOpNotifier, Notifier, SlackNotifier};
use lw_store::{RedisStateStore, StateStore};

#[tokio::main]
async fn main() -> Result<()> {
    lw_common::logging::init_logging("lw-server");
    info!("Starting LogWarden");

    // Boot-time configuration errors are fatal.
    let config = ConfigLoader::new().load().context("configuration error")?;

    // So is an unreachable state store.
    let store: Arc<dyn StateStore> = Arc::new(
        RedisStateStore::connect(&config.store)
            .await
            .context("state store unreachable")?,
    );
    info!(mode = ?config.store.mode, "State store connected");

    let notifier: Arc<dyn Notifier> = if !config.alerting.enabled {
        info!("Alerting disabled, notifications are a no-op");
        Arc::new(NoOpNotifier)
    } else if config.notifier.webhook_url.is_empty() {
        warn!("No webhook configured, notifications are a no-op");
        Arc::new(NoOpNotifier)
    } else {
        let slack = SlackNotifier::new(config.notifier.clone())?;
        if let Err(e) = slack.test_connection().await {
            warn!(error = %e, "Webhook connection test failed");
        }
        Arc::new(slack)
    };

    let engine = Arc::new(AlertEngine::new(
        store.clone(),
        notifier,
        &config.templates.alert_message,
    ));

    // First boot: an empty store gets the seed rules.
    if engine.reload_rules().await? == 0 {
        info!("No rules stored, installing seed rules");
        for rule in default_rules() {
            if let Err(e) = engine.add_rule(rule).await {
                warn!(error = %e, "Failed to install seed rule");
            }
        }
    }
    info!(rules = engine.rules().len(), "Rule snapshot loaded");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let housekeeping = engine.spawn_housekeeping(shutdown_tx.subscribe());

    let telemetry = Arc::new(ConsumerTelemetry::new());
    let consumer_handle = if config.log_processing.enabled {
        let processor = Arc::new(RecordProcessor::new(
            engine.clone(),
            store.clone(),
            telemetry.clone(),
            config.log_processing.default_log_level.clone(),
            config.log_processing.stats_every,
        ));
        let shutdown_rx = shutdown_tx.subscribe();

        // An unreachable bus at boot is fatal; steady-state bus errors are
        // handled inside the consumer loop.
        let handle = if config.log_processing.batch_size > 1 {
            let consumer = BatchLogConsumer::new(
                &config.bus,
                processor,
                telemetry.clone(),
                config.log_processing.batch_size,
                Duration::from_secs(config.log_processing.flush_interval_secs),
            )
            .context("bus unreachable")?;
            tokio::spawn(async move { consumer.run(shutdown_rx).await })
        } else {
            let consumer = KafkaLogConsumer::new(&config.bus, processor, telemetry.clone())
                .context("bus unreachable")?;
            tokio::spawn(async move { consumer.run(shutdown_rx).await })
        };
        Some(handle)
    } else {
        info!("Log processing disabled, consumer not started");
        None
    };

    // Control plane.
    let state = ApiState {
        engine: engine.clone(),
        store: store.clone(),
        telemetry: telemetry.clone(),
        default_log_level: config.log_processing.default_log_level.clone(),
    };
    let listener = tokio::net::TcpListener::bind(&config.server.address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.address))?;
    info!(address = %config.server.address, "Control plane listening");

    let mut server_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, api_router(state))
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await
    });

    shutdown_signal().await;
    info!("Shutdown signal received, draining");
    let _ = shutdown_tx.send(());

    if let Some(handle) = consumer_handle {
        let _ = handle.await;
    }
    let _ = housekeeping.await;
    let _ = server.await;
    info!("LogWarden stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
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
