//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for providers, stores, dispatchers and transports.
pub mod ports;

/// Engine services: registry, sessions, routing, alert evaluation.
pub mod services;
