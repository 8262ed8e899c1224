//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the port interfaces defined in the
//! application layer, plus the process-level plumbing (config, logging,
//! metrics, HTTP).

/// Environment-driven configuration.
pub mod config;

/// HTTP and WebSocket server.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Notification dispatchers.
pub mod notify;

/// In-memory alert and settings stores.
pub mod persistence;

/// Market data provider adapters.
pub mod provider;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;

/// Client transports (WebSocket, in-memory).
pub mod transport;
