//! Notification dispatcher that writes to the log.
//!
//! Stands in for the email/SMS/chat senders. Each channel gets one
//! structured `info` event.

use async_trait::async_trait;

use crate::application::ports::NotificationDispatcher;
use crate::domain::notification::{NotificationChannel, NotificationIntent};

/// Logs every notification instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDispatcher;

impl LoggingDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn send_to_channels(&self, intent: &NotificationIntent, channels: &[NotificationChannel]) {
        for channel in channels.iter().filter(|c| c.enabled) {
            tracing::info!(
                channel = channel.kind.as_str(),
                target = %channel.target,
                kind = intent.kind.as_str(),
                symbol = %intent.symbol,
                title = %intent.title,
                message = %intent.message,
                "Notification sent"
            );
        }
    }
}
