//! Quote Engine
//!
//! Wires the registry, router, evaluator and notification bridge together
//! and exposes the two entry points used by transport adapters:
//! [`QuoteEngine::open_session`] and [`QuoteEngine::submit_analysis`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::evaluator::AlertEvaluator;
use super::notifier::NotificationBridge;
use super::poller::AlertPoller;
use super::registry::ConnectionRegistry;
use super::router::{BroadcastRouter, RouterConfig, RouterStats};
use super::session::{SessionConfig, SessionHandle, StreamSession, Upstream};
use crate::application::ports::{
    AlertStore, ConfigStore, Connection, MarketDataProvider, MarketDataProviderFactory,
    NotificationDispatcher, ProviderError, StoreError, UserSettings,
};
use crate::domain::market::normalize_symbols;
use crate::domain::notification::AnalysisResult;

/// External collaborators the engine depends on.
#[derive(Clone)]
pub struct EnginePorts {
    /// Selects a market data provider from configuration.
    pub providers: Arc<dyn MarketDataProviderFactory>,
    /// Alert reads and the trigger mutation.
    pub alerts: Arc<dyn AlertStore>,
    /// User settings.
    pub config: Arc<dyn ConfigStore>,
    /// Channel delivery.
    pub dispatcher: Arc<dyn NotificationDispatcher>,
}

/// Engine tuning.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineSettings {
    /// Per-session queue sizes and timeouts.
    pub session: SessionConfig,
    /// Evaluator queue sizing.
    pub router: RouterConfig,
    /// Alert polling interval; `None` disables the poller.
    pub poll_interval: Option<Duration>,
}

/// Failure to resolve the configured provider.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// Settings could not be read.
    #[error("failed to load settings: {0}")]
    Settings(#[from] StoreError),
    /// The provider could not be created.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// The running quote distribution and alert engine.
pub struct QuoteEngine {
    ports: EnginePorts,
    registry: Arc<ConnectionRegistry>,
    router: BroadcastRouter,
    sessions: StreamSession,
    bridge: NotificationBridge,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl QuoteEngine {
    /// Start the engine: spawns the evaluator and, if enabled, the poller.
    ///
    /// Everything the engine spawns stops when `shutdown` is cancelled.
    #[must_use]
    pub fn start(ports: EnginePorts, settings: EngineSettings, shutdown: CancellationToken) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let (router, evaluator_rx) = BroadcastRouter::new(settings.router);
        let bridge = NotificationBridge::new(
            Arc::clone(&ports.dispatcher),
            Arc::clone(&ports.config),
            Arc::clone(&registry),
        );
        let tracker = TaskTracker::new();
        let sessions = StreamSession::new(
            Arc::clone(&registry),
            router.clone(),
            settings.session,
            shutdown.clone(),
            tracker.clone(),
        );

        let evaluator = AlertEvaluator::new(Arc::clone(&ports.alerts), bridge.clone());
        let mut background = vec![tokio::spawn(evaluator.run(evaluator_rx, shutdown.clone()))];

        if let Some(interval) = settings.poll_interval {
            let poller = AlertPoller::new(
                Arc::clone(&ports.alerts),
                Arc::clone(&ports.config),
                Arc::clone(&ports.providers),
                router.clone(),
                interval,
            );
            background.push(tokio::spawn(poller.run(shutdown.clone())));
        }

        Self {
            ports,
            registry,
            router,
            sessions,
            bridge,
            shutdown,
            tracker,
            background: Mutex::new(background),
        }
    }

    /// Open a stream session for a newly accepted connection.
    ///
    /// Settings are read once here. An unreadable configuration or an
    /// empty symbol list yields an idle session; a provider that cannot be
    /// created yields one error event and a closed session.
    pub async fn open_session(&self, connection: Connection) -> SessionHandle {
        let settings = match self.ports.config.load().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, peer = %connection.peer, "Failed to load settings, session will idle");
                UserSettings::default()
            }
        };

        let symbols = normalize_symbols(&settings.tracked_symbols);
        let upstream = if symbols.is_empty() {
            Upstream::None
        } else {
            match self.ports.providers.create(&settings.market_data) {
                Ok(provider) => Upstream::Provider(provider),
                Err(e) => Upstream::Unavailable(e),
            }
        };

        self.sessions.start(connection, symbols, upstream)
    }

    /// Submit a finished analysis.
    ///
    /// Returns `true` if it qualified for a notification (BUY or SELL at or
    /// above the confidence threshold) and a dispatch was started.
    pub fn submit_analysis(&self, analysis: &AnalysisResult) -> bool {
        self.bridge.notify_analysis(analysis).is_some()
    }

    /// Resolve the configured market data provider.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Settings` if settings cannot be read and
    /// `LookupError::Provider` if the provider cannot be created.
    pub async fn provider(&self) -> Result<Arc<dyn MarketDataProvider>, LookupError> {
        let settings = self.ports.config.load().await?;
        Ok(self.ports.providers.create(&settings.market_data)?)
    }

    /// Live connections.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Router statistics.
    #[must_use]
    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every session and background task, then wait up to `grace`
    /// for them to exit.
    ///
    /// Returns `false` if the grace period ran out first.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.tracker.close();

        let background: Vec<_> = std::mem::take(&mut *self.background.lock());
        let drained = tokio::time::timeout(grace, async {
            self.tracker.wait().await;
            for task in background {
                let _ = task.await;
            }
        })
        .await
        .is_ok();

        if drained {
            tracing::info!("Quote engine stopped");
        } else {
            tracing::warn!(
                connections = self.registry.len(),
                "Quote engine shutdown grace period elapsed"
            );
        }
        drained
    }
}

impl std::fmt::Debug for QuoteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteEngine")
            .field("connections", &self.registry.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}
