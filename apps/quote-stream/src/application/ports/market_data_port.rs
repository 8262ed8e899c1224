//! Market Data Port (Driven Port)
//!
//! Capability contract for a market data vendor. Each vendor adapter
//! implements [`MarketDataProvider`]; a [`MarketDataProviderFactory`]
//! picks the adapter named in configuration once per session or request.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::config_port::MarketDataSettings;
use crate::domain::market::{Candle, HistoryPeriod, Quote, Symbol};

/// Market data provider error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// No adapter is registered under the configured name.
    #[error("unknown market data provider: {0}")]
    UnknownProvider(String),

    /// The adapter needs credentials that were not configured.
    #[error("market data provider {0} requires an API key")]
    MissingCredentials(String),

    /// Symbol is not known to the vendor.
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    /// The vendor could not be reached or the stream died.
    #[error("market data unavailable: {0}")]
    Unavailable(String),
}

/// Port for fetching and streaming market data.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Adapter name, as used in configuration.
    fn name(&self) -> &str;

    /// Fetch the current quote for a symbol.
    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError>;

    /// Fetch historical candles for a symbol.
    async fn get_historical_data(
        &self,
        symbol: &Symbol,
        period: HistoryPeriod,
    ) -> Result<Vec<Candle>, ProviderError>;

    /// Stream quotes for `symbols` into `sink` until cancelled.
    ///
    /// Returns `Ok(())` when `cancel` fires or the sink is closed, and an
    /// error only for an unrecoverable upstream failure. Quotes for one
    /// symbol are sent in the order the vendor produced them.
    async fn stream_quotes(
        &self,
        symbols: &[Symbol],
        sink: mpsc::Sender<Quote>,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError>;
}

/// Selects a provider adapter from configuration.
pub trait MarketDataProviderFactory: Send + Sync {
    /// Create the provider named in `settings`.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the provider is unknown or misconfigured.
    fn create(
        &self,
        settings: &MarketDataSettings,
    ) -> Result<Arc<dyn MarketDataProvider>, ProviderError>;
}
