//! fanout-gateway server entry point.
//!
//! Starts the broker consumer and the Axum HTTP server with REST and
//! WebSocket endpoints, and shuts both down on Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fanout_gateway::api;
use fanout_gateway::app_state::AppState;
use fanout_gateway::config::{GatewayConfig, LogFormat};
use fanout_gateway::consumer::{AmqpBroker, EventConsumer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting fanout-gateway");

    let state = AppState::new(config.hub_outbound_capacity);
    let shutdown = CancellationToken::new();

    // Start broker consumer
    let consumer_task = if config.consumer_enabled {
        let consumer = EventConsumer::new(
            AmqpBroker::new(config.amqp_url.clone(), config.prefetch),
            Arc::new(state.dispatcher()),
            config.queues.clone(),
        )
        .with_decode_failure_policy(config.decode_failure)
        .with_backoff(config.backoff());
        Some(tokio::spawn(consumer.run(shutdown.clone())))
    } else {
        tracing::warn!("broker consumer disabled");
        None
    };

    // Start server
    let app = api::build_app(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    tokio::spawn(signal_shutdown(shutdown.clone()));
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .context("http server failed")?;

    // Let an in-flight message settle
    shutdown.cancel();
    if let Some(task) = consumer_task
        && let Err(err) = task.await
    {
        tracing::error!(error = %err, "consumer task failed");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Cancels `token` on Ctrl-C or, on Unix, SIGTERM.
async fn signal_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
    token.cancel();
}
