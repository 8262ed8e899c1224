#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Quote Stream - Real-time Quote Distribution and Price Alerts
//!
//! Streams live quotes from a market data provider to connected clients
//! and evaluates every tick against the user's price alerts. A triggered
//! alert is flagged exactly once and then fanned out to the user's
//! notification channels and to every connected client.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Symbols, quotes, alerts and notification intents
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Alert store, settings, market data, notification and transport contracts
//!   - `services`: Connection registry, stream sessions, tick router,
//!     alert evaluator, notification bridge, alert poller, engine
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `provider`: Simulated and scripted market data
//!   - `persistence`: In-memory alert and settings stores
//!   - `transport`: WebSocket and in-memory client connections
//!   - `http`: axum server (WebSocket upgrade, REST, health, metrics)
//!   - `config`, `telemetry`, `metrics`: process plumbing
//!
//! # Data Flow
//!
//! ```text
//!                        ┌──────────────┐  try_send   ┌────────┐
//! Provider ──► Session ─►│   Router     │────────────►│ Client │
//!                        │              │             └────────┘
//!                        │              │  send
//! Poller ───────────────►│              │────────────► Evaluator ──► Store (trigger)
//!                        └──────────────┘                  │
//!                                                          ▼
//!                                              Notification Bridge ──► Channels
//!                                                          │
//!                                                          └──► every Client
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::alert::{Alert, AlertCondition, AlertId};
pub use domain::market::{Candle, HistoryPeriod, Quote, Symbol, normalize_symbols};
pub use domain::notification::{
    AnalysisResult, ChannelKind, NotificationChannel, NotificationIntent, NotificationKind,
    TradeAction,
};

// Engine
pub use application::services::{
    EnginePorts, EngineSettings, QuoteEngine, SessionEnd, SessionHandle,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, EngineConfig};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, HttpServerError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
