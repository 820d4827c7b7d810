use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

use orderflow_infra::{ConsumerOptions, MessagingConfig, consumer_from_config};
use orderflow_worker::{HandlerRegistry, WorkerSettings};

/// How long in-flight work may take to drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    orderflow_observability::init();

    let args: Vec<String> = std::env::args().collect();
    let settings = WorkerSettings::resolve(
        args.get(1).map(String::as_str),
        args.get(2).map(String::as_str),
        args.get(3).map(String::as_str),
        |key| std::env::var(key).ok(),
    )
    .with_context(|| {
        let bin = args.first().map(String::as_str).unwrap_or("orderflow-worker");
        format!("usage: {bin} <order|notification|sms> [queue-name] [routing-pattern]")
    })?;

    info!(
        kind = %settings.kind,
        queue = %settings.queue_name,
        pattern = %settings.routing_pattern,
        "starting worker"
    );

    let config = MessagingConfig::from_env().context("invalid messaging configuration")?;
    let consumer = consumer_from_config(&config, ConsumerOptions::default())
        .await
        .context("failed to construct consumer")?;

    let handler = HandlerRegistry::with_defaults().resolve(settings.kind);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = consumer
        .consume(
            shutdown_rx,
            &settings.queue_name,
            &settings.routing_pattern,
            handler,
        )
        .await
        .context("failed to start consuming")?;

    info!("worker started, waiting for deliveries");
    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");

    let _ = shutdown_tx.send(());
    if timeout(DRAIN_TIMEOUT, handle.join()).await.is_err() {
        warn!("drain timed out with a handler still in flight");
    }

    // Close errors are reported but never block process exit.
    if let Err(err) = consumer.close().await {
        error!(error = %err, "error closing consumer");
    }

    info!("worker stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler, relying on ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
