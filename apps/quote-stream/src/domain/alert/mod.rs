//! Price Alert Types
//!
//! Domain types for threshold price alerts. Alerts are created and
//! deleted outside the engine; the engine only reads active alerts and
//! flags them as triggered.
//!
//! # Crossing semantics
//!
//! An alert is satisfied when the tick price is at or beyond its
//! threshold in the direction of its condition. Triggering flips the
//! alert inactive, so further ticks on the same side of the threshold
//! are ignored until an external actor re-activates it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::{Quote, Symbol};

/// Unique alert identifier.
pub type AlertId = u64;

/// Direction of a threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    /// Fires when price is at or above the threshold.
    Above,
    /// Fires when price is at or below the threshold.
    Below,
}

impl AlertCondition {
    /// Check whether `price` satisfies this condition for `threshold`.
    #[must_use]
    pub fn is_met(self, price: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::Above => price >= threshold,
            Self::Below => price <= threshold,
        }
    }

    /// Get the condition name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unrecognised condition name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown alert condition: {0}")]
pub struct UnknownCondition(pub String);

impl FromStr for AlertCondition {
    type Err = UnknownCondition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "above" => Ok(Self::Above),
            "below" => Ok(Self::Below),
            other => Err(UnknownCondition(other.to_string())),
        }
    }
}

/// A threshold price alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert identifier.
    pub id: AlertId,
    /// Symbol the alert watches.
    pub symbol: Symbol,
    /// Threshold direction.
    pub condition: AlertCondition,
    /// Threshold price.
    pub threshold: Decimal,
    /// Whether the alert is armed.
    pub active: bool,
    /// When the alert last fired.
    pub triggered_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Create a new armed alert.
    #[must_use]
    pub const fn new(
        id: AlertId,
        symbol: Symbol,
        condition: AlertCondition,
        threshold: Decimal,
    ) -> Self {
        Self {
            id,
            symbol,
            condition,
            threshold,
            active: true,
            triggered_at: None,
        }
    }

    /// Check whether this alert fires for `quote`.
    ///
    /// Inactive alerts and alerts for other symbols never fire.
    #[must_use]
    pub fn is_triggered_by(&self, quote: &Quote) -> bool {
        self.active
            && self.symbol == quote.symbol
            && self.condition.is_met(quote.price, self.threshold)
    }
}

// =============================================================================
// Tests
// =============================================================================
