//! Transport Port (Driver Port)
//!
//! A client connection as seen by a stream session: a writer half that
//! delivers [`SessionEvent`]s and a reader half used only to detect that
//! the peer is still there.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::market::Quote;
use crate::domain::notification::NotificationIntent;

/// Message delivered to a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Informational notice (e.g. nothing tracked).
    Info {
        /// Human-readable notice.
        message: String,
    },
    /// A live quote.
    Quote {
        /// The quote.
        quote: Quote,
    },
    /// The session hit an error and is ending.
    Error {
        /// Human-readable reason.
        message: String,
    },
    /// A notification was dispatched for the user.
    Notification {
        /// The dispatched notification.
        notification: NotificationIntent,
    },
    /// Keep-alive probe; transports map this to their own ping frame.
    #[serde(skip)]
    Heartbeat,
}

impl SessionEvent {
    /// Build an informational event.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    /// Build an error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Inbound signal from a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// The client sent something (data, pong, ping).
    Frame,
    /// The client closed the connection cleanly.
    Closed,
}

/// Transport error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection is already closed.
    #[error("connection closed")]
    Closed,

    /// A read or write did not complete in time.
    #[error("transport timed out after {0:?}")]
    Timeout(Duration),

    /// The event could not be encoded for the wire.
    #[error("failed to encode event: {0}")]
    Encode(String),

    /// Underlying I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Outbound half of a client connection.
#[async_trait]
pub trait TransportWriter: Send {
    /// Write one event to the client.
    async fn send(&mut self, event: &SessionEvent) -> Result<(), TransportError>;

    /// Close the connection from the server side.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Inbound half of a client connection.
#[async_trait]
pub trait TransportReader: Send {
    /// Wait for the next inbound frame.
    async fn recv(&mut self) -> Result<Inbound, TransportError>;
}

/// A client connection handed to a stream session.
pub struct Connection {
    /// Peer description used in logs.
    pub peer: String,
    /// Outbound half.
    pub writer: Box<dyn TransportWriter>,
    /// Inbound half.
    pub reader: Box<dyn TransportReader>,
}

impl Connection {
    /// Assemble a connection from its two halves.
    #[must_use]
    pub fn new(
        peer: impl Into<String>,
        writer: Box<dyn TransportWriter>,
        reader: Box<dyn TransportReader>,
    ) -> Self {
        Self {
            peer: peer.into(),
            writer,
            reader,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
