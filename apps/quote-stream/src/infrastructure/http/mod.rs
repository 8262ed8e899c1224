//! HTTP and WebSocket Server
//!
//! # Endpoints
//!
//! - `GET /api/ws` - Upgrade to a WebSocket quote stream
//! - `POST /api/analysis` - Submit a finished analysis result
//! - `GET /api/quote/{symbol}` - Current quote from the configured provider
//! - `GET /api/historical/{symbol}?period=1m` - Historical candles
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (fails once shutdown starts)
//! - `GET /metrics` - Prometheus metrics in text format
//!
//! Errors are returned as `{"error": "..."}`.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::application::services::{LookupError, QuoteEngine, RouterStats};
use crate::domain::market::{HistoryPeriod, Symbol};
use crate::domain::notification::AnalysisResult;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::transport::websocket;

/// Upper bound on a provider call made for an HTTP request.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// State
// =============================================================================

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<QuoteEngine>,
    version: &'static str,
    started_at: Instant,
}

impl AppState {
    /// Create handler state around a running engine.
    #[must_use]
    pub fn new(engine: Arc<QuoteEngine>) -> Self {
        Self {
            engine,
            version: env!("CARGO_PKG_VERSION"),
            started_at: Instant::now(),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .route("/api/analysis", post(analysis_handler))
        .route("/api/quote/{symbol}", get(quote_handler))
        .route("/api/historical/{symbol}", get(historical_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors_layer())
        .with_state(state)
}

/// Browser clients are served from a different origin.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// Server
// =============================================================================

/// HTTP/WebSocket server.
pub struct HttpServer {
    port: u16,
    state: AppState,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: AppState, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server hits a
    /// fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError::ServerFailed` on a fatal server error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HttpServerError> {
        let port = listener.local_addr().map_or(self.port, |a| a.port());
        tracing::info!(port, "HTTP server listening");

        axum::serve(
            listener,
            router(self.state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(self.cancel.cancelled_owned())
        .await
        .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Settings(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Provider(_) => StatusCode::BAD_REQUEST,
        };
        error_response(status, self.to_string())
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` while serving, `stopping` once shutdown starts.
    pub status: String,
    /// Current time, RFC 3339.
    pub time: String,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Connected clients.
    pub connections: usize,
    /// Tick routing counters since start.
    pub ticks: TickStats,
}

/// Router counters reported by `/health`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TickStats {
    /// Ticks handed to the alert evaluator.
    pub routed: u64,
    /// Ticks dropped for slow clients.
    pub dropped: u64,
    /// Ticks waiting for evaluation.
    pub evaluator_backlog: usize,
}

impl From<RouterStats> for TickStats {
    fn from(stats: RouterStats) -> Self {
        Self {
            routed: stats.routed,
            dropped: stats.dropped,
            evaluator_backlog: stats.evaluator_backlog,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    if state.engine.is_shutting_down() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Server shutting down");
    }

    ws.on_upgrade(move |socket| async move {
        let connection = websocket::connection(socket, peer.to_string());
        let handle = state.engine.open_session(connection).await;
        let reason = handle.join().await;
        tracing::debug!(%peer, reason = reason.as_str(), "WebSocket session finished");
    })
}

#[derive(Debug, Serialize)]
struct AnalysisAccepted {
    notified: bool,
}

async fn analysis_handler(
    State(state): State<AppState>,
    body: Result<Json<AnalysisResult>, JsonRejection>,
) -> Response {
    let Ok(Json(analysis)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON");
    };
    let notified = state.engine.submit_analysis(&analysis);
    (StatusCode::ACCEPTED, Json(AnalysisAccepted { notified })).into_response()
}

async fn quote_handler(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let Some(symbol) = Symbol::parse(&raw) else {
        return error_response(StatusCode::BAD_REQUEST, "Symbol required");
    };
    let provider = match state.engine.provider().await {
        Ok(provider) => provider,
        Err(e) => return e.into_response(),
    };

    match tokio::time::timeout(PROVIDER_TIMEOUT, provider.get_quote(&symbol)).await {
        Ok(Ok(quote)) => Json(quote).into_response(),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(_) => error_response(StatusCode::GATEWAY_TIMEOUT, "Provider timed out"),
    }
}

#[derive(Debug, Deserialize)]
struct HistoricalParams {
    period: Option<String>,
}

async fn historical_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(params): Query<HistoricalParams>,
) -> Response {
    let Some(symbol) = Symbol::parse(&raw) else {
        return error_response(StatusCode::BAD_REQUEST, "Symbol required");
    };
    let period = match params.period.as_deref().filter(|p| !p.trim().is_empty()) {
        None => HistoryPeriod::default(),
        Some(code) => match HistoryPeriod::from_str(code) {
            Ok(period) => period,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        },
    };
    let provider = match state.engine.provider().await {
        Ok(provider) => provider,
        Err(e) => return e.into_response(),
    };

    match tokio::time::timeout(
        PROVIDER_TIMEOUT,
        provider.get_historical_data(&symbol, period),
    )
    .await
    {
        Ok(Ok(candles)) => Json(candles).into_response(),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(_) => error_response(StatusCode::GATEWAY_TIMEOUT, "Provider timed out"),
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.engine.is_shutting_down() {
        "stopping"
    } else {
        "healthy"
    };
    Json(HealthResponse {
        status: status.to_string(),
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        version: state.version.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        connections: state.engine.registry().len(),
        ticks: state.engine.router_stats().into(),
    })
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.engine.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
