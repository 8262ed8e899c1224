//! Connection Registry
//!
//! Tracks the live client connections so that process-wide events (in-app
//! notifications, shutdown accounting) can reach every session.
//!
//! # Design
//!
//! - Registration hands back a [`ConnectionToken`] that is not `Clone`;
//!   [`ConnectionRegistry::unregister`] consumes it, so a connection leaves
//!   the registry exactly once.
//! - Iteration copies the handles out under a short read lock and runs the
//!   callback with no lock held. A callback may therefore call back into
//!   the registry without deadlocking.
//! - No ordering guarantee between connections.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::SessionEvent;
use crate::domain::market::Symbol;
use crate::infrastructure::metrics;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a client connection.
pub type ConnectionId = Uuid;

/// What the registry knows about one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Peer description used in logs.
    pub peer: String,
    /// Sender side of the connection's outbound queue.
    pub outbound: mpsc::Sender<SessionEvent>,
    /// The owning session's cancellation token.
    pub cancel: CancellationToken,
    /// The session's subscription set.
    pub symbols: Arc<[Symbol]>,
    /// When the connection was accepted.
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh connection id.
    #[must_use]
    pub fn new(
        peer: impl Into<String>,
        outbound: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
        symbols: Arc<[Symbol]>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer: peer.into(),
            outbound,
            cancel,
            symbols,
            connected_at: Utc::now(),
        }
    }
}

/// Proof of registration. Consumed by [`ConnectionRegistry::unregister`].
#[derive(Debug)]
#[must_use = "dropping the token leaks the registration"]
pub struct ConnectionToken {
    id: ConnectionId,
}

impl ConnectionToken {
    /// The registered connection's id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Thread-safe set of live connections.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use quote_stream::application::services::{ConnectionHandle, ConnectionRegistry};
/// use tokio_util::sync::CancellationToken;
///
/// let registry = ConnectionRegistry::new();
/// let (tx, _rx) = tokio::sync::mpsc::channel(8);
/// let handle = ConnectionHandle::new("127.0.0.1:5000", tx, CancellationToken::new(), Arc::from([]));
///
/// let token = registry.register(handle);
/// assert_eq!(registry.len(), 1);
///
/// assert!(registry.unregister(token));
/// assert!(registry.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    pub fn register(&self, handle: ConnectionHandle) -> ConnectionToken {
        let id = handle.id;
        let count = {
            let mut connections = self.connections.write();
            connections.insert(id, handle);
            connections.len()
        };
        metrics::set_active_connections(count);
        tracing::debug!(connection_id = %id, connections = count, "Connection registered");
        ConnectionToken { id }
    }

    /// Remove a connection.
    ///
    /// Returns `false` if the connection was not present.
    pub fn unregister(&self, token: ConnectionToken) -> bool {
        let (removed, count) = {
            let mut connections = self.connections.write();
            let removed = connections.remove(&token.id);
            (removed, connections.len())
        };
        metrics::set_active_connections(count);
        let connected_secs = removed
            .as_ref()
            .map_or(0, |h| (Utc::now() - h.connected_at).num_seconds());
        tracing::debug!(
            connection_id = %token.id,
            connections = count,
            connected_secs,
            "Connection unregistered"
        );
        removed.is_some()
    }

    /// Copy out the current set of handles.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.read().values().cloned().collect()
    }

    /// Run `f` over a snapshot of the current connections.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ConnectionHandle),
    {
        for handle in self.snapshot() {
            f(&handle);
        }
    }

    /// Push `event` to every connected client without waiting.
    ///
    /// Clients whose outbound queue is full or closed miss the event.
    /// Returns the number of clients the event was queued for.
    pub fn broadcast(&self, event: &SessionEvent) -> usize {
        let mut delivered = 0;
        self.for_each(|handle| match handle.outbound.try_send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(connection_id = %handle.id, "Outbound queue full, broadcast skipped");
            }
            Err(TrySendError::Closed(_)) => {}
        });
        delivered
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Whether a connection is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_handle(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let symbols: Arc<[Symbol]> = Arc::from(vec![Symbol::new("ACME")]);
        (
            ConnectionHandle::new("test-peer", tx, CancellationToken::new(), symbols),
            rx,
        )
    }

    #[test]
    fn register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = make_handle(4);
        let id = handle.id;

        let token = registry.register(handle);
        assert_eq!(token.id(), id);
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(token));
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn handles_get_distinct_ids() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = make_handle(4);
        let (b, _rx_b) = make_handle(4);

        let ta = registry.register(a);
        let tb = registry.register(b);
        assert_ne!(ta.id(), tb.id());
        assert_eq!(registry.len(), 2);

        registry.unregister(ta);
        registry.unregister(tb);
    }

    #[test]
    fn for_each_callback_can_reenter_registry() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = make_handle(4);
        let token = registry.register(handle);

        let mut seen = 0;
        registry.for_each(|h| {
            // Would deadlock if the read lock were held here.
            let (other, _rx) = make_handle(1);
            let t = registry.register(other);
            registry.unregister(t);
            assert!(registry.contains(h.id));
            seen += 1;
        });
        assert_eq!(seen, 1);

        registry.unregister(token);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = make_handle(4);
        let (b, mut rx_b) = make_handle(4);
        let ta = registry.register(a);
        let tb = registry.register(b);

        let delivered = registry.broadcast(&SessionEvent::info("hello"));
        assert_eq!(delivered, 2);
        assert_eq!(rx_a.recv().await.unwrap(), SessionEvent::info("hello"));
        assert_eq!(rx_b.recv().await.unwrap(), SessionEvent::info("hello"));

        registry.unregister(ta);
        registry.unregister(tb);
    }

    #[test]
    fn broadcast_skips_full_and_closed_queues() {
        let registry = ConnectionRegistry::new();
        let (full, _rx_full) = make_handle(1);
        full.outbound.try_send(SessionEvent::info("backlog")).unwrap();
        let (closed, rx_closed) = make_handle(1);
        drop(rx_closed);
        let (open, _rx_open) = make_handle(1);

        let tokens = [
            registry.register(full),
            registry.register(closed),
            registry.register(open),
        ];

        assert_eq!(registry.broadcast(&SessionEvent::info("hi")), 1);

        for token in tokens {
            registry.unregister(token);
        }
    }

    #[test]
    fn concurrent_register_unregister() {
        let registry = Arc::new(ConnectionRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let (handle, _rx) = make_handle(1);
                        let token = registry.register(handle);
                        let _ = registry.snapshot();
                        assert!(registry.unregister(token));
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
