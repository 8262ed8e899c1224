//! Quote Stream Binary
//!
//! Starts the quote distribution and price alert service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-stream
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_STREAM_HTTP_PORT`: HTTP/WebSocket port (default: 8080)
//! - `TRACKED_SYMBOLS`: Comma-separated symbols to stream (default: none)
//! - `MARKET_DATA_PROVIDER`: Provider adapter name (default: simulated)
//! - `MARKET_DATA_API_KEY`: Provider API key
//! - `NOTIFICATION_CHANNELS`: `kind:target` list, e.g. `email:me@example.com`
//! - `SEED_ALERTS`: `SYMBOL:above|below:PRICE` list
//! - `QUOTE_STREAM_ALERT_POLLING`: Poll alerts without clients (default: true)
//! - `QUOTE_STREAM_SHUTDOWN_GRACE_SECS`: Session drain limit (default: 30)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use quote_stream::application::services::{EnginePorts, QuoteEngine};
use quote_stream::infrastructure::http::{AppState, HttpServer};
use quote_stream::infrastructure::notify::LoggingDispatcher;
use quote_stream::infrastructure::persistence::{InMemoryAlertStore, InMemoryConfigStore};
use quote_stream::infrastructure::provider::ProviderRegistry;
use quote_stream::infrastructure::telemetry;
use quote_stream::{EngineConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting Quote Stream");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = EngineConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let ports = EnginePorts {
        providers: Arc::new(ProviderRegistry::with_simulated(config.simulated)),
        alerts: Arc::new(InMemoryAlertStore::with_alerts(config.alerts.seed.clone())),
        config: Arc::new(InMemoryConfigStore::new(config.user.clone())),
        dispatcher: Arc::new(LoggingDispatcher::new()),
    };

    let engine_token = CancellationToken::new();
    let engine = Arc::new(QuoteEngine::start(
        ports,
        config.engine_settings(),
        engine_token,
    ));

    let http_token = CancellationToken::new();
    let http_server = HttpServer::new(
        config.server.http_port,
        AppState::new(Arc::clone(&engine)),
        http_token.clone(),
    );
    let mut http_task = tokio::spawn(http_server.run());

    tracing::info!("Quote Stream ready");

    tokio::select! {
        () = await_signal() => {}
        joined = &mut http_task => {
            http_token.cancel();
            engine.shutdown(config.session.shutdown_grace).await;
            return match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("HTTP server failed"),
                Err(e) => Err(e).context("HTTP server task panicked"),
            };
        }
    }

    tracing::info!(
        grace_secs = config.session.shutdown_grace.as_secs(),
        connections = engine.registry().len(),
        "Graceful shutdown started"
    );

    if !engine.shutdown(config.session.shutdown_grace).await {
        tracing::warn!("Some sessions did not finish before the grace period");
    }
    http_token.cancel();
    if let Ok(Err(e)) = http_task.await {
        tracing::error!(error = %e, "HTTP server error");
    }

    tracing::info!("Quote Stream stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        provider = %config.user.market_data.provider,
        tracked_symbols = config.user.tracked_symbols.len(),
        channels = config.user.notification_channels.len(),
        seed_alerts = config.alerts.seed.len(),
        polling = config.alerts.polling_enabled,
        "Configuration loaded"
    );
    tracing::debug!(
        outbound_capacity = config.session.outbound_capacity,
        evaluator_capacity = config.router.evaluator_capacity,
        heartbeat_secs = config.session.heartbeat_interval.as_secs(),
        idle_timeout_secs = config.session.idle_timeout.as_secs(),
        "Session tuning"
    );
}

/// Wait for SIGTERM or SIGINT.
#[allow(clippy::expect_used)]
async fn await_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
