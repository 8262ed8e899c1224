//! Market Data Types
//!
//! Core domain types for market data: symbols, quotes and candles.
//! These types are transport-agnostic and represent the canonical
//! internal representation of a tick.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Symbol
// =============================================================================

/// A ticker symbol, always trimmed and uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, normalizing case and surrounding whitespace.
    ///
    /// Returns `None` if the input is blank.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_uppercase()))
    }

    /// Create a symbol from a value known to be non-blank.
    ///
    /// Blank input produces an empty symbol that matches nothing upstream.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| Self(String::new()))
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| "symbol cannot be blank".to_string())
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a raw symbol list into a subscription set.
///
/// Blank entries are dropped and duplicates (after uppercasing) are removed.
/// First-seen order is preserved.
#[must_use]
pub fn normalize_symbols<I, S>(raw: I) -> Vec<Symbol>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|s| Symbol::parse(s.as_ref()))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

// =============================================================================
// Quote
// =============================================================================

/// One price update for a symbol at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Last traded price.
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Time the provider observed the price.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Create a quote stamped with the current time.
    #[must_use]
    pub fn new(symbol: Symbol, price: Decimal) -> Self {
        Self::at(symbol, price, Utc::now())
    }

    /// Create a quote with an explicit timestamp.
    #[must_use]
    pub const fn at(symbol: Symbol, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol,
            price,
            timestamp,
        }
    }
}

// =============================================================================
// Historical Data
// =============================================================================

/// OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open time.
    pub timestamp: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: u64,
}

/// Lookback window for historical candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HistoryPeriod {
    /// One trading day of intraday candles.
    #[serde(rename = "1d")]
    OneDay,
    /// One week of daily candles.
    #[serde(rename = "1w")]
    OneWeek,
    /// One month of daily candles.
    #[default]
    #[serde(rename = "1m")]
    OneMonth,
    /// Three months of daily candles.
    #[serde(rename = "3m")]
    ThreeMonths,
    /// One year of daily candles.
    #[serde(rename = "1y")]
    OneYear,
}

impl HistoryPeriod {
    /// Get the period code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::OneWeek => "1w",
            Self::OneMonth => "1m",
            Self::ThreeMonths => "3m",
            Self::OneYear => "1y",
        }
    }

    /// Number of daily candles covered by the period.
    #[must_use]
    pub const fn days(&self) -> u32 {
        match self {
            Self::OneDay => 1,
            Self::OneWeek => 7,
            Self::OneMonth => 30,
            Self::ThreeMonths => 90,
            Self::OneYear => 365,
        }
    }
}

/// Error returned for an unrecognised period code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown history period: {0}")]
pub struct UnknownPeriod(pub String);

impl FromStr for HistoryPeriod {
    type Err = UnknownPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1d" => Ok(Self::OneDay),
            "1w" => Ok(Self::OneWeek),
            "1m" => Ok(Self::OneMonth),
            "3m" => Ok(Self::ThreeMonths),
            "1y" => Ok(Self::OneYear),
            other => Err(UnknownPeriod(other.to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
