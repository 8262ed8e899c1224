//! Notification Port (Driven Port)
//!
//! Interface to the channel senders (email, SMS, chat). Delivery is
//! best-effort: the dispatcher logs its own failures and never reports
//! them back to the engine.

use async_trait::async_trait;

use crate::domain::notification::{NotificationChannel, NotificationIntent};

/// Port for delivering a notification to the user's channels.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Send `intent` to every channel in `channels`.
    async fn send_to_channels(&self, intent: &NotificationIntent, channels: &[NotificationChannel]);
}
