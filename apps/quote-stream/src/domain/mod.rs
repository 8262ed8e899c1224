//! Domain Layer - Core quote, alert and notification types.
//!
//! This layer contains the core domain types for quote distribution and
//! price alerting with no infrastructure dependencies. All types here are
//! plain Rust values with serialization support.

/// Market data types (symbols, quotes, candles).
pub mod market;

/// Price alerts and threshold conditions.
pub mod alert;

/// Notification intents and analysis signal policy.
pub mod notification;
