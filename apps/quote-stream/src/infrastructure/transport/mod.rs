//! Client Transports
//!
//! Adapters that turn a concrete client connection into the session
//! [`Connection`](crate::application::ports::Connection) pair.

pub mod memory;
pub mod websocket;
