//! Alert Polling Service
//!
//! Feeds the alert evaluator when no client is streaming. On every
//! interval it reads the active alerts, fetches one quote per distinct
//! symbol and forwards those quotes to the evaluator queue.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::router::BroadcastRouter;
use crate::application::ports::{AlertStore, ConfigStore, MarketDataProviderFactory};
use crate::domain::market::Symbol;
use crate::infrastructure::metrics::{self, StoreOp};

/// Shortest poll period; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Periodic alert poller.
#[derive(Clone)]
pub struct AlertPoller {
    store: Arc<dyn AlertStore>,
    config: Arc<dyn ConfigStore>,
    factory: Arc<dyn MarketDataProviderFactory>,
    router: BroadcastRouter,
    interval: Duration,
}

impl AlertPoller {
    /// Create a poller that runs every `interval`.
    #[must_use]
    pub fn new(
        store: Arc<dyn AlertStore>,
        config: Arc<dyn ConfigStore>,
        factory: Arc<dyn MarketDataProviderFactory>,
        router: BroadcastRouter,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            config,
            factory,
            router,
            interval,
        }
    }

    /// Poll once. Returns the number of quotes forwarded to the evaluator.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> usize {
        let symbols: BTreeSet<Symbol> = match self.store.active_alerts().await {
            Ok(alerts) => alerts.into_iter().map(|a| a.symbol).collect(),
            Err(e) => {
                metrics::record_store_error(StoreOp::Read);
                tracing::warn!(error = %e, "Poller failed to read active alerts");
                return 0;
            }
        };
        if symbols.is_empty() {
            return 0;
        }

        let settings = match self.config.load().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Poller failed to load settings");
                return 0;
            }
        };
        let provider = match self.factory.create(&settings.market_data) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::debug!(error = %e, "Poller has no usable market data provider");
                return 0;
            }
        };

        let mut forwarded = 0;
        for symbol in &symbols {
            match provider.get_quote(symbol).await {
                Ok(quote) => {
                    if !self.router.forward_to_evaluator(quote, cancel).await {
                        break;
                    }
                    forwarded += 1;
                }
                Err(e) => {
                    tracing::debug!(symbol = %symbol, error = %e, "Poller quote fetch failed");
                }
            }
        }
        forwarded
    }

    /// Poll on the configured interval until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = self.interval.as_secs(), "Alert poller started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let forwarded = self.poll_once(&cancel).await;
                    tracing::debug!(forwarded, "Alert poll complete");
                }
            }
        }

        tracing::info!("Alert poller stopped");
    }
}

impl std::fmt::Debug for AlertPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertPoller")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
