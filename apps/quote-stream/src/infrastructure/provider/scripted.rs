//! Hand-fed provider for tests and demos.
//!
//! Quotes pushed with [`ScriptedProvider::push`] go to every open stream
//! whose symbol set contains the quote's symbol. [`ScriptedProvider::fail`]
//! ends every open stream with an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{MarketDataProvider, ProviderError};
use crate::domain::market::{Candle, HistoryPeriod, Quote, Symbol};

#[derive(Debug, Clone)]
enum Feed {
    Tick(Quote),
    Fail(String),
}

/// Provider driven by the caller.
#[derive(Debug)]
pub struct ScriptedProvider {
    feed: broadcast::Sender<Feed>,
    last: RwLock<HashMap<Symbol, Quote>>,
    history: RwLock<HashMap<Symbol, Vec<Candle>>>,
    open_streams: Arc<AtomicUsize>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the open stream count when a stream ends.
struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    /// Create a provider with no data.
    #[must_use]
    pub fn new() -> Self {
        Self {
            feed: broadcast::channel(1_024).0,
            last: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish a quote to open streams and remember it for `get_quote`.
    pub fn push(&self, quote: Quote) {
        self.last.write().insert(quote.symbol.clone(), quote.clone());
        let _ = self.feed.send(Feed::Tick(quote));
    }

    /// Set the current quote without publishing it.
    pub fn set_quote(&self, quote: Quote) {
        self.last.write().insert(quote.symbol.clone(), quote);
    }

    /// Set the candles returned for `symbol`.
    pub fn set_history(&self, symbol: Symbol, candles: Vec<Candle>) {
        self.history.write().insert(symbol, candles);
    }

    /// End every open stream with `reason`.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.feed.send(Feed::Fail(reason.into()));
    }

    /// Number of streams currently open.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError> {
        self.last
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| ProviderError::SymbolNotFound(symbol.to_string()))
    }

    async fn get_historical_data(
        &self,
        symbol: &Symbol,
        _period: HistoryPeriod,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.history
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| ProviderError::SymbolNotFound(symbol.to_string()))
    }

    async fn stream_quotes(
        &self,
        symbols: &[Symbol],
        sink: mpsc::Sender<Quote>,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError> {
        let mut feed = self.feed.subscribe();
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let _guard = StreamGuard(Arc::clone(&self.open_streams));

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                next = feed.recv() => next,
            };

            match next {
                Ok(Feed::Tick(quote)) if symbols.contains(&quote.symbol) => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Ok(()),
                        sent = sink.send(quote) => {
                            if sent.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
                Ok(Feed::Tick(_)) => {}
                Ok(Feed::Fail(reason)) => return Err(ProviderError::Unavailable(reason)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Scripted stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }
}
