//! Config Store Port (Driven Port)
//!
//! Read-only access to the user's settings. Sessions read the settings
//! once at start; changing them requires a new session.

use async_trait::async_trait;

use super::alert_store_port::StoreError;
use crate::domain::notification::NotificationChannel;

/// Market data provider selection.
#[derive(Clone, Default)]
pub struct MarketDataSettings {
    /// Provider adapter name (e.g. `simulated`).
    pub provider: String,
    /// Vendor API key, if the adapter needs one.
    pub api_key: Option<String>,
}

impl MarketDataSettings {
    /// Create settings for a provider without credentials.
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for MarketDataSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataSettings")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Snapshot of the user's settings.
#[derive(Debug, Clone, Default)]
pub struct UserSettings {
    /// Raw tracked symbols, as entered by the user.
    pub tracked_symbols: Vec<String>,
    /// Market data provider selection.
    pub market_data: MarketDataSettings,
    /// Configured notification channels.
    pub notification_channels: Vec<NotificationChannel>,
}

impl UserSettings {
    /// Channels the user has enabled.
    #[must_use]
    pub fn enabled_channels(&self) -> Vec<NotificationChannel> {
        self.notification_channels
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect()
    }
}

/// Port for reading user settings.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the current settings snapshot.
    async fn load(&self) -> Result<UserSettings, StoreError>;
}
