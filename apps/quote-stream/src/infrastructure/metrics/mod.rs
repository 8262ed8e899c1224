//! Prometheus Metrics Module
//!
//! Exposes engine metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Quotes received from providers, routed, and dropped
//! - **Connections**: Live client sessions
//! - **Alerts**: Triggers, trigger conflicts, store failures, evaluation latency
//! - **Notifications**: Dispatches by kind
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::notification::NotificationKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus metrics recorder.
///
/// Calling this again after a successful install returns the existing handle.
///
/// # Errors
///
/// Returns `BuildError` if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Tick counters
    describe_counter!(
        "quote_stream_ticks_received_total",
        "Total quotes received from market data providers"
    );
    describe_counter!(
        "quote_stream_ticks_routed_total",
        "Total quotes delivered to a route"
    );
    describe_counter!(
        "quote_stream_ticks_dropped_total",
        "Total quotes dropped because a client queue was full"
    );

    // Connection gauge
    describe_gauge!(
        "quote_stream_active_connections",
        "Number of registered client connections"
    );

    // Alert counters
    describe_counter!(
        "quote_stream_alerts_triggered_total",
        "Total alerts flagged as triggered"
    );
    describe_counter!(
        "quote_stream_alert_trigger_conflicts_total",
        "Trigger attempts that found the alert already triggered"
    );
    describe_counter!(
        "quote_stream_store_errors_total",
        "Alert store failures by operation"
    );

    // Notification counters
    describe_counter!(
        "quote_stream_notifications_dispatched_total",
        "Notifications handed to the dispatcher by kind"
    );
    describe_counter!(
        "quote_stream_analysis_signals_total",
        "Analysis results received, by whether they were actionable"
    );

    describe_histogram!(
        "quote_stream_alert_evaluation_seconds",
        "Time to evaluate one tick against the active alerts"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for tick routes.
#[derive(Debug, Clone, Copy)]
pub enum Route {
    /// The owning connection's outbound queue.
    Client,
    /// The shared alert evaluator queue.
    Evaluator,
}

impl Route {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Evaluator => "evaluator",
        }
    }
}

/// Metric labels for alert store operations.
#[derive(Debug, Clone, Copy)]
pub enum StoreOp {
    /// Reading active alerts.
    Read,
    /// Flagging an alert as triggered.
    Trigger,
}

impl StoreOp {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Trigger => "trigger",
        }
    }
}

/// Record a quote received from a provider.
pub fn record_tick_received(provider: &str) {
    counter!(
        "quote_stream_ticks_received_total",
        "provider" => provider.to_string()
    )
    .increment(1);
}

/// Record a quote delivered to a route.
pub fn record_tick_routed(route: Route) {
    counter!(
        "quote_stream_ticks_routed_total",
        "route" => route.as_str()
    )
    .increment(1);
}

/// Record a quote dropped for a slow client.
pub fn record_tick_dropped() {
    counter!("quote_stream_ticks_dropped_total").increment(1);
}

/// Update the registered connection count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_connections(count: usize) {
    gauge!("quote_stream_active_connections").set(count as f64);
}

/// Record an alert transition to triggered.
pub fn record_alert_triggered() {
    counter!("quote_stream_alerts_triggered_total").increment(1);
}

/// Record a trigger attempt that lost the race.
pub fn record_trigger_conflict() {
    counter!("quote_stream_alert_trigger_conflicts_total").increment(1);
}

/// Record an alert store failure.
pub fn record_store_error(op: StoreOp) {
    counter!(
        "quote_stream_store_errors_total",
        "op" => op.as_str()
    )
    .increment(1);
}

/// Record a notification handed to the dispatcher.
pub fn record_notification_dispatched(kind: NotificationKind) {
    counter!(
        "quote_stream_notifications_dispatched_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record an analysis result and whether it qualified for a notification.
pub fn record_analysis_signal(actionable: bool) {
    counter!(
        "quote_stream_analysis_signals_total",
        "actionable" => if actionable { "true" } else { "false" }
    )
    .increment(1);
}

/// Record how long one tick took to evaluate.
pub fn record_evaluation_duration(duration: Duration) {
    histogram!("quote_stream_alert_evaluation_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_as_str() {
        assert_eq!(Route::Client.as_str(), "client");
        assert_eq!(Route::Evaluator.as_str(), "evaluator");
    }

    #[test]
    fn store_op_as_str() {
        assert_eq!(StoreOp::Read.as_str(), "read");
        assert_eq!(StoreOp::Trigger.as_str(), "trigger");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_tick_received("simulated");
        record_tick_dropped();
        set_active_connections(3);
        record_evaluation_duration(Duration::from_millis(2));
        record_notification_dispatched(NotificationKind::PriceAlert);
    }
}
