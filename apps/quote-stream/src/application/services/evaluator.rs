//! Alert Evaluator
//!
//! Single consumer of the aggregated tick queue. Every tick is tested
//! against the alerts that are active at that moment.
//!
//! # Design
//!
//! - No alert state is cached between ticks; the store is the source of
//!   truth and is read once per tick.
//! - The trigger mutation is applied before any notification is built.
//!   Only a call that observes [`TriggerOutcome::Triggered`] notifies, so
//!   a duplicate tick (or a concurrent evaluator) cannot notify twice.
//! - Store failures are logged and skipped; the loop never exits on them.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::notifier::NotificationBridge;
use crate::application::ports::{AlertStore, TriggerOutcome};
use crate::domain::market::Quote;
use crate::domain::notification::NotificationIntent;
use crate::infrastructure::metrics::{self, StoreOp};

/// Tests ticks against active alerts.
#[derive(Clone)]
pub struct AlertEvaluator {
    store: Arc<dyn AlertStore>,
    bridge: NotificationBridge,
}

impl AlertEvaluator {
    /// Create an evaluator.
    #[must_use]
    pub fn new(store: Arc<dyn AlertStore>, bridge: NotificationBridge) -> Self {
        Self { store, bridge }
    }

    /// Evaluate one tick.
    ///
    /// Returns the number of alerts this call triggered.
    pub async fn evaluate(&self, quote: &Quote) -> usize {
        let started = Instant::now();

        let alerts = match self.store.active_alerts().await {
            Ok(alerts) => alerts,
            Err(e) => {
                metrics::record_store_error(StoreOp::Read);
                tracing::warn!(error = %e, symbol = %quote.symbol, "Failed to read active alerts, tick skipped");
                return 0;
            }
        };

        let mut triggered = 0;
        for alert in alerts.iter().filter(|a| a.is_triggered_by(quote)) {
            match self.store.trigger_alert(alert.id).await {
                Ok(TriggerOutcome::Triggered) => {
                    metrics::record_alert_triggered();
                    tracing::info!(
                        alert_id = alert.id,
                        symbol = %alert.symbol,
                        condition = %alert.condition,
                        threshold = %alert.threshold,
                        price = %quote.price,
                        "Alert triggered"
                    );
                    // Detached; delivery is the dispatcher's concern.
                    drop(self.bridge.dispatch(NotificationIntent::price_alert(alert, quote)));
                    triggered += 1;
                }
                Ok(TriggerOutcome::AlreadyTriggered) => {
                    metrics::record_trigger_conflict();
                    tracing::debug!(alert_id = alert.id, "Alert already triggered");
                }
                Err(e) => {
                    metrics::record_store_error(StoreOp::Trigger);
                    tracing::warn!(alert_id = alert.id, error = %e, "Failed to trigger alert, notification suppressed");
                }
            }
        }

        metrics::record_evaluation_duration(started.elapsed());
        triggered
    }

    /// Consume ticks from `rx` in arrival order until cancelled or the
    /// queue closes.
    pub async fn run(self, mut rx: mpsc::Receiver<Quote>, cancel: CancellationToken) {
        tracing::info!("Alert evaluator started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(quote) => {
                        self.evaluate(&quote).await;
                    }
                    None => break,
                },
            }
        }
        tracing::info!("Alert evaluator stopped");
    }
}

impl std::fmt::Debug for AlertEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEvaluator").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{
        ConfigStore, MockAlertStore, NotificationDispatcher, StoreError, UserSettings,
    };
    use crate::application::services::registry::ConnectionRegistry;
    use crate::application::services::router::{BroadcastRouter, RouterConfig};
    use crate::domain::alert::{Alert, AlertCondition, AlertId};
    use crate::domain::market::Symbol;
    use crate::domain::notification::{ChannelKind, NotificationChannel};
    use crate::infrastructure::persistence::InMemoryAlertStore;

    struct EmailOnly;

    #[async_trait]
    impl ConfigStore for EmailOnly {
        async fn load(&self) -> Result<UserSettings, StoreError> {
            Ok(UserSettings {
                notification_channels: vec![NotificationChannel::new(
                    ChannelKind::Email,
                    "ops@example.com",
                )],
                ..UserSettings::default()
            })
        }
    }

    struct Recorder(mpsc::UnboundedSender<NotificationIntent>);

    #[async_trait]
    impl NotificationDispatcher for Recorder {
        async fn send_to_channels(
            &self,
            intent: &NotificationIntent,
            _channels: &[NotificationChannel],
        ) {
            let _ = self.0.send(intent.clone());
        }
    }

    fn evaluator_with(
        store: impl AlertStore + 'static,
    ) -> (AlertEvaluator, mpsc::UnboundedReceiver<NotificationIntent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = NotificationBridge::new(
            Arc::new(Recorder(tx)),
            Arc::new(EmailOnly),
            Arc::new(ConnectionRegistry::new()),
        );
        (AlertEvaluator::new(Arc::new(store), bridge), rx)
    }

    fn acme_alert(id: AlertId) -> Alert {
        Alert::new(
            id,
            Symbol::new("ACME"),
            AlertCondition::Above,
            Decimal::new(10_000, 2),
        )
    }

    fn acme(price: i64) -> Quote {
        Quote::new(Symbol::new("ACME"), Decimal::new(price, 2))
    }

    #[tokio::test]
    async fn triggers_then_notifies() {
        let mut store = MockAlertStore::new();
        store
            .expect_active_alerts()
            .returning(|| Ok(vec![acme_alert(7)]));
        store
            .expect_trigger_alert()
            .withf(|id| *id == 7)
            .times(1)
            .returning(|_| Ok(TriggerOutcome::Triggered));

        let (evaluator, mut notes) = evaluator_with(store);
        assert_eq!(evaluator.evaluate(&acme(10_000)).await, 1);

        let intent = tokio::time::timeout(Duration::from_secs(1), notes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.title, "Price Alert: ACME");
        assert_eq!(intent.message, "ACME is now $100.00 (above $100.00)");
    }

    #[tokio::test]
    async fn unmet_condition_never_touches_trigger() {
        let mut store = MockAlertStore::new();
        store
            .expect_active_alerts()
            .returning(|| Ok(vec![acme_alert(7)]));
        store.expect_trigger_alert().times(0);

        let (evaluator, _notes) = evaluator_with(store);
        assert_eq!(evaluator.evaluate(&acme(9_990)).await, 0);
    }

    #[tokio::test]
    async fn other_symbols_are_ignored() {
        let mut store = MockAlertStore::new();
        store
            .expect_active_alerts()
            .returning(|| Ok(vec![acme_alert(7)]));
        store.expect_trigger_alert().times(0);

        let (evaluator, _notes) = evaluator_with(store);
        let other = Quote::new(Symbol::new("XYZ"), Decimal::new(50_000, 2));
        assert_eq!(evaluator.evaluate(&other).await, 0);
    }

    #[tokio::test]
    async fn read_failure_skips_tick() {
        let mut store = MockAlertStore::new();
        store
            .expect_active_alerts()
            .returning(|| Err(StoreError::Unavailable("timeout".into())));
        store.expect_trigger_alert().times(0);

        let (evaluator, mut notes) = evaluator_with(store);
        assert_eq!(evaluator.evaluate(&acme(10_500)).await, 0);
        assert!(notes.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_or_noop_trigger_suppresses_notification() {
        let mut store = MockAlertStore::new();
        store
            .expect_active_alerts()
            .returning(|| Ok(vec![acme_alert(1), acme_alert(2), acme_alert(3)]));
        store.expect_trigger_alert().returning(|id| match id {
            1 => Ok(TriggerOutcome::AlreadyTriggered),
            2 => Err(StoreError::NotFound(2)),
            _ => Ok(TriggerOutcome::Triggered),
        });

        let (evaluator, mut notes) = evaluator_with(store);
        assert_eq!(evaluator.evaluate(&acme(10_100)).await, 1);

        tokio::time::timeout(Duration::from_secs(1), notes.recv())
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(notes.try_recv().is_err());
    }

    /// Store whose trigger flips a single flag with compare-and-set.
    struct OneShotStore {
        fired: AtomicBool,
    }

    #[async_trait]
    impl AlertStore for OneShotStore {
        async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
            // Simulates a stale read: the alert still looks active.
            Ok(vec![acme_alert(42)])
        }

        async fn trigger_alert(&self, _id: AlertId) -> Result<TriggerOutcome, StoreError> {
            tokio::task::yield_now().await;
            if self
                .fired
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                Ok(TriggerOutcome::Triggered)
            } else {
                Ok(TriggerOutcome::AlreadyTriggered)
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn duplicate_concurrent_ticks_notify_once() {
        let (evaluator, mut notes) = evaluator_with(OneShotStore {
            fired: AtomicBool::new(false),
        });

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let evaluator = evaluator.clone();
                tokio::spawn(async move { evaluator.evaluate(&acme(10_200)).await })
            })
            .collect();

        let mut total = 0;
        for task in tasks {
            total += task.await.unwrap();
        }
        assert_eq!(total, 1);

        tokio::time::timeout(Duration::from_secs(1), notes.recv())
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(notes.try_recv().is_err());
    }

    #[tokio::test]
    async fn interleaved_sources_are_evaluated_in_arrival_order() {
        let below = Alert::new(
            2,
            Symbol::new("ACME"),
            AlertCondition::Below,
            Decimal::new(10_000, 2),
        );
        let store = Arc::new(InMemoryAlertStore::with_alerts([acme_alert(1), below]));
        let (notes_tx, mut notes) = mpsc::unbounded_channel();
        let bridge = NotificationBridge::new(
            Arc::new(Recorder(notes_tx)),
            Arc::new(EmailOnly),
            Arc::new(ConnectionRegistry::new()),
        );
        let evaluator = AlertEvaluator::new(Arc::clone(&store) as Arc<dyn AlertStore>, bridge);

        let (router, eval_rx) = BroadcastRouter::new(RouterConfig::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(evaluator.run(eval_rx, cancel.clone()));

        // Session ticks go through `route`, polled quotes straight to the
        // evaluator; both share one queue.
        let (outbound, _client) = mpsc::channel(16);
        router.route(acme(10_100), &outbound, &cancel).await;
        router.forward_to_evaluator(acme(9_900), &cancel).await;
        router.route(acme(10_200), &outbound, &cancel).await;
        router.forward_to_evaluator(acme(9_800), &cancel).await;

        let mut messages = Vec::new();
        for _ in 0..2 {
            let intent = tokio::time::timeout(Duration::from_secs(1), notes.recv())
                .await
                .unwrap()
                .unwrap();
            messages.push(intent.message);
        }
        messages.sort();
        assert_eq!(
            messages,
            vec![
                "ACME is now $101.00 (above $100.00)".to_string(),
                "ACME is now $99.00 (below $100.00)".to_string(),
            ]
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(notes.try_recv().is_err());
        assert!(!store.get(1).unwrap().active);
        assert!(!store.get(2).unwrap().active);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let mut store = MockAlertStore::new();
        store.expect_active_alerts().returning(|| Ok(vec![]));

        let (evaluator, _notes) = evaluator_with(store);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(evaluator.run(rx, cancel.clone()));

        tx.send(acme(100)).await.unwrap();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn run_stops_when_queue_closes() {
        let mut store = MockAlertStore::new();
        store.expect_active_alerts().returning(|| Ok(vec![]));

        let (evaluator, _notes) = evaluator_with(store);
        let (tx, rx) = mpsc::channel::<Quote>(4);
        let task = tokio::spawn(evaluator.run(rx, CancellationToken::new()));

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
