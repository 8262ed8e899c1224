//! Notification Bridge
//!
//! Turns a notification intent into a detached dispatch task. The task
//! reads the user's enabled channels and hands the intent to the
//! dispatcher; the caller never waits on delivery.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::registry::ConnectionRegistry;
use crate::application::ports::{ConfigStore, NotificationDispatcher, SessionEvent};
use crate::domain::notification::{AnalysisResult, NotificationIntent};
use crate::infrastructure::metrics;

/// Bridge from engine events to the external notifier.
#[derive(Clone)]
pub struct NotificationBridge {
    dispatcher: Arc<dyn NotificationDispatcher>,
    config: Arc<dyn ConfigStore>,
    registry: Arc<ConnectionRegistry>,
}

impl NotificationBridge {
    /// Create a bridge.
    #[must_use]
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: Arc<dyn ConfigStore>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            dispatcher,
            config,
            registry,
        }
    }

    /// Dispatch `intent` in the background.
    ///
    /// Connected clients get the intent as a `notification` event right
    /// away. The returned handle completes once the dispatcher returns; it
    /// can be dropped.
    pub fn dispatch(&self, intent: NotificationIntent) -> JoinHandle<()> {
        self.registry.broadcast(&SessionEvent::Notification {
            notification: intent.clone(),
        });
        metrics::record_notification_dispatched(intent.kind);

        let dispatcher = Arc::clone(&self.dispatcher);
        let config = Arc::clone(&self.config);
        tokio::spawn(async move {
            let channels = match config.load().await {
                Ok(settings) => settings.enabled_channels(),
                Err(e) => {
                    tracing::warn!(error = %e, symbol = %intent.symbol, "Could not load notification channels");
                    return;
                }
            };

            if channels.is_empty() {
                tracing::debug!(symbol = %intent.symbol, "No enabled notification channels");
                return;
            }

            dispatcher.send_to_channels(&intent, &channels).await;
            tracing::info!(
                kind = intent.kind.as_str(),
                symbol = %intent.symbol,
                channels = channels.len(),
                "Notification dispatched"
            );
        })
    }

    /// Notify about an analysis result if it is actionable.
    ///
    /// Returns the dispatch handle when a notification was sent.
    pub fn notify_analysis(&self, analysis: &AnalysisResult) -> Option<JoinHandle<()>> {
        let intent = NotificationIntent::from_analysis(analysis);
        metrics::record_analysis_signal(intent.is_some());
        intent.map(|intent| self.dispatch(intent))
    }
}

impl std::fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("connections", &self.registry.len())
            .finish_non_exhaustive()
    }
}
