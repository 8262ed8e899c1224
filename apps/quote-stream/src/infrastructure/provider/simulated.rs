//! Random-walk market data.
//!
//! Each symbol starts from a price derived from its name and moves by at
//! most `max_step_bps` basis points per tick.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{MarketDataProvider, ProviderError};
use crate::domain::market::{Candle, HistoryPeriod, Quote, Symbol};

/// Simulated provider settings.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedConfig {
    /// Time between ticks for each streamed symbol set.
    pub tick_interval: Duration,
    /// Largest per-tick move, in basis points.
    pub max_step_bps: i64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            max_step_bps: 50,
        }
    }
}

/// Random-walk quote source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedProvider {
    config: SimulatedConfig,
}

const MIN_TICK: Duration = Duration::from_millis(1);

const MIN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

impl SimulatedProvider {
    /// Create a provider.
    #[must_use]
    pub const fn new(config: SimulatedConfig) -> Self {
        Self { config }
    }

    /// Deterministic starting price in `[20.00, 520.00)`.
    fn base_price(symbol: &Symbol) -> Decimal {
        let seed = symbol
            .as_str()
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        Decimal::new(2_000 + i64::from(seed % 50_000), 2)
    }

    fn step(&self, price: Decimal) -> Decimal {
        let bps = rand::rng().random_range(-self.config.max_step_bps..=self.config.max_step_bps);
        (price + price * Decimal::new(bps, 4)).round_dp(2).max(MIN_PRICE)
    }
}

#[async_trait]
impl MarketDataProvider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError> {
        Ok(Quote::new(
            symbol.clone(),
            self.step(Self::base_price(symbol)),
        ))
    }

    async fn get_historical_data(
        &self,
        symbol: &Symbol,
        period: HistoryPeriod,
    ) -> Result<Vec<Candle>, ProviderError> {
        let days = i64::from(period.days());
        let now = Utc::now();
        let mut close = Self::base_price(symbol);
        let mut candles = Vec::with_capacity(usize::try_from(days).unwrap_or_default());

        for offset in (0..days).rev() {
            let open = close;
            close = self.step(open);
            let (low, high) = if open <= close { (open, close) } else { (close, open) };
            candles.push(Candle {
                timestamp: now - ChronoDuration::days(offset),
                open,
                high,
                low,
                close,
                volume: rand::rng().random_range(100_000..5_000_000),
            });
        }
        Ok(candles)
    }

    async fn stream_quotes(
        &self,
        symbols: &[Symbol],
        sink: mpsc::Sender<Quote>,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError> {
        let mut prices: HashMap<Symbol, Decimal> = symbols
            .iter()
            .map(|s| (s.clone(), Self::base_price(s)))
            .collect();
        let mut ticker = tokio::time::interval(self.config.tick_interval.max(MIN_TICK));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            for symbol in symbols {
                let Some(price) = prices.get_mut(symbol) else {
                    continue;
                };
                *price = self.step(*price);
                let quote = Quote::new(symbol.clone(), *price);

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
        }
    }
}
