//! Broadcast Router
//!
//! Fans each tick out to two independent bounded queues: the owning
//! connection's outbound queue and the shared alert evaluator queue.
//!
//! # Backpressure
//!
//! - **Client queue**: non-blocking. When full, the newest tick is dropped
//!   for that connection and counted. A closed queue ends that session only.
//! - **Evaluator queue**: awaited, racing the session's cancellation token,
//!   so a slow client never starves alert evaluation and a stuck evaluator
//!   never blocks shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::application::ports::SessionEvent;
use crate::domain::market::Quote;
use crate::infrastructure::metrics::{self, Route};

// =============================================================================
// Configuration
// =============================================================================

/// Router queue sizing.
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Capacity of the shared evaluator queue.
    pub evaluator_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            evaluator_capacity: 4_096,
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// What happened to one routed tick on the client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued for the client and for the evaluator.
    Delivered,
    /// The client queue was full; the tick still reached the evaluator.
    ClientFull,
    /// The client queue is closed; the session should end.
    ClientClosed,
    /// Cancelled while waiting on the evaluator queue.
    Cancelled,
}

/// Explicit two-way fan-out of ticks.
#[derive(Debug, Clone)]
pub struct BroadcastRouter {
    evaluator_tx: mpsc::Sender<Quote>,
    stats: Arc<RouterCounters>,
}

#[derive(Debug, Default)]
struct RouterCounters {
    routed: AtomicU64,
    dropped: AtomicU64,
    evaluator_closed: AtomicU64,
}

impl BroadcastRouter {
    /// Create a router and the receiving end of its evaluator queue.
    #[must_use]
    pub fn new(config: RouterConfig) -> (Self, mpsc::Receiver<Quote>) {
        let (evaluator_tx, evaluator_rx) = mpsc::channel(config.evaluator_capacity.max(1));
        (
            Self {
                evaluator_tx,
                stats: Arc::new(RouterCounters::default()),
            },
            evaluator_rx,
        )
    }

    /// Route one tick to `outbound` and to the evaluator.
    pub async fn route(
        &self,
        quote: Quote,
        outbound: &mpsc::Sender<SessionEvent>,
        cancel: &CancellationToken,
    ) -> RouteOutcome {
        let client = match outbound.try_send(SessionEvent::Quote {
            quote: quote.clone(),
        }) {
            Ok(()) => {
                metrics::record_tick_routed(Route::Client);
                RouteOutcome::Delivered
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_tick_dropped();
                tracing::debug!(symbol = %quote.symbol, "Client queue full, tick dropped");
                RouteOutcome::ClientFull
            }
            Err(TrySendError::Closed(_)) => RouteOutcome::ClientClosed,
        };

        if !self.forward_to_evaluator(quote, cancel).await {
            return RouteOutcome::Cancelled;
        }
        client
    }

    /// Send a tick to the evaluator only.
    ///
    /// Returns `false` if `cancel` fired before the tick was queued.
    pub async fn forward_to_evaluator(&self, quote: Quote, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            sent = self.evaluator_tx.send(quote) => {
                match sent {
                    Ok(()) => {
                        self.stats.routed.fetch_add(1, Ordering::Relaxed);
                        metrics::record_tick_routed(Route::Evaluator);
                    }
                    Err(_) => {
                        // Evaluator already stopped; only happens during shutdown.
                        self.stats.evaluator_closed.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("Evaluator queue closed, tick not evaluated");
                    }
                }
                true
            }
        }
    }

    /// Router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            routed: self.stats.routed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            evaluator_closed: self.stats.evaluator_closed.load(Ordering::Relaxed),
            evaluator_backlog: self.evaluator_tx.max_capacity() - self.evaluator_tx.capacity(),
        }
    }
}

/// Statistics about routed ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Ticks that reached the evaluator queue.
    pub routed: u64,
    /// Ticks dropped for a slow client.
    pub dropped: u64,
    /// Ticks offered after the evaluator stopped.
    pub evaluator_closed: u64,
    /// Ticks waiting in the evaluator queue.
    pub evaluator_backlog: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::market::Symbol;

    fn quote(price: i64) -> Quote {
        Quote::new(Symbol::new("ACME"), Decimal::new(price, 2))
    }

    fn small_router() -> (BroadcastRouter, mpsc::Receiver<Quote>) {
        BroadcastRouter::new(RouterConfig {
            evaluator_capacity: 8,
        })
    }

    #[tokio::test]
    async fn tick_reaches_both_routes() {
        let (router, mut eval_rx) = small_router();
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let outcome = router.route(quote(9850), &out_tx, &cancel).await;
        assert_eq!(outcome, RouteOutcome::Delivered);

        assert_eq!(eval_rx.recv().await.unwrap(), unwrap_quote(&out_rx.recv().await.unwrap()));
        assert_eq!(router.stats().routed, 1);
    }

    fn unwrap_quote(event: &SessionEvent) -> Quote {
        match event {
            SessionEvent::Quote { quote } => quote.clone(),
            other => panic!("expected quote event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_client_queue_drops_newest_but_evaluator_still_sees_it() {
        let (router, mut eval_rx) = small_router();
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let first = quote(100);
        let second = quote(200);
        assert_eq!(
            router.route(first.clone(), &out_tx, &cancel).await,
            RouteOutcome::Delivered
        );
        assert_eq!(
            router.route(second.clone(), &out_tx, &cancel).await,
            RouteOutcome::ClientFull
        );

        // Client kept the older tick, evaluator saw both.
        assert_eq!(unwrap_quote(&out_rx.recv().await.unwrap()), first);
        assert_eq!(eval_rx.recv().await.unwrap(), first);
        assert_eq!(eval_rx.recv().await.unwrap(), second);
        assert_eq!(router.stats().dropped, 1);
    }

    #[tokio::test]
    async fn closed_client_queue_is_reported() {
        let (router, mut eval_rx) = small_router();
        let (out_tx, out_rx) = mpsc::channel(1);
        drop(out_rx);
        let cancel = CancellationToken::new();

        let outcome = router.route(quote(100), &out_tx, &cancel).await;
        assert_eq!(outcome, RouteOutcome::ClientClosed);
        assert!(eval_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn cancellation_unblocks_full_evaluator_queue() {
        let (router, _eval_rx) = BroadcastRouter::new(RouterConfig {
            evaluator_capacity: 1,
        });
        let (out_tx, _out_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        assert!(router.forward_to_evaluator(quote(1), &cancel).await);
        assert_eq!(router.stats().evaluator_backlog, 1);

        let pending = {
            let router = router.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { router.route(quote(2), &out_tx, &cancel).await })
        };

        cancel.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Cancelled);
    }

    #[tokio::test]
    async fn stopped_evaluator_does_not_block_clients() {
        let (router, eval_rx) = small_router();
        drop(eval_rx);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let outcome = router.route(quote(100), &out_tx, &cancel).await;
        assert_eq!(outcome, RouteOutcome::Delivered);
        assert!(out_rx.recv().await.is_some());
        assert_eq!(router.stats().evaluator_closed, 1);
    }
}
