//! Notification Types
//!
//! Notification intents produced by the alert evaluator and by the
//! analysis-signal path, plus the channel descriptors they are routed to.
//! Intents are ephemeral and never persisted by the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::alert::Alert;
use crate::domain::market::{Quote, Symbol};

/// Minimum analysis confidence that produces a signal notification.
pub const MIN_SIGNAL_CONFIDENCE: f64 = 0.7;

// =============================================================================
// Intents
// =============================================================================

/// Kind of notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A price alert crossed its threshold.
    PriceAlert,
    /// Analysis recommends buying.
    BuySignal,
    /// Analysis recommends selling.
    SellSignal,
}

impl NotificationKind {
    /// Get the kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PriceAlert => "price_alert",
            Self::BuySignal => "buy_signal",
            Self::SellSignal => "sell_signal",
        }
    }
}

/// A notification waiting to be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    /// Notification kind.
    pub kind: NotificationKind,
    /// Short title.
    pub title: String,
    /// Message body.
    pub message: String,
    /// Symbol the notification concerns.
    pub symbol: Symbol,
}

impl NotificationIntent {
    /// Build the intent for an alert that fired on `quote`.
    #[must_use]
    pub fn price_alert(alert: &Alert, quote: &Quote) -> Self {
        Self {
            kind: NotificationKind::PriceAlert,
            title: format!("Price Alert: {}", alert.symbol),
            message: format!(
                "{} is now ${:.2} ({} ${:.2})",
                alert.symbol, quote.price, alert.condition, alert.threshold
            ),
            symbol: alert.symbol.clone(),
        }
    }

    /// Build the intent for an analysis result, if it qualifies.
    ///
    /// Only BUY and SELL actions with confidence at or above
    /// [`MIN_SIGNAL_CONFIDENCE`] produce a notification.
    #[must_use]
    pub fn from_analysis(analysis: &AnalysisResult) -> Option<Self> {
        if !analysis.is_actionable() {
            return None;
        }

        let kind = match analysis.action {
            TradeAction::Buy => NotificationKind::BuySignal,
            TradeAction::Sell => NotificationKind::SellSignal,
            TradeAction::Hold => return None,
        };

        Some(Self {
            kind,
            title: format!("{} Signal: {}", analysis.action, analysis.symbol),
            message: analysis.reasoning.clone(),
            symbol: analysis.symbol.clone(),
        })
    }
}

// =============================================================================
// Analysis Results
// =============================================================================

/// Recommended trade action from an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    /// Open or add to a long position.
    Buy,
    /// Close or reduce a position.
    Sell,
    /// No action.
    Hold,
}

impl TradeAction {
    /// Get the action name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished analysis produced outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Analysed symbol.
    pub symbol: Symbol,
    /// Recommended action.
    pub action: TradeAction,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Free-text reasoning.
    pub reasoning: String,
}

impl AnalysisResult {
    /// Whether this result should notify the user.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        matches!(self.action, TradeAction::Buy | TradeAction::Sell)
            && self.confidence >= MIN_SIGNAL_CONFIDENCE
    }
}

// =============================================================================
// Channels
// =============================================================================

/// Delivery channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Email address.
    Email,
    /// SMS phone number.
    Sms,
    /// Discord webhook.
    Discord,
    /// Structured log output.
    Log,
}

impl ChannelKind {
    /// Get the channel kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Discord => "discord",
            Self::Log => "log",
        }
    }
}

/// Error returned for an unrecognised channel kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for ChannelKind {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "discord" => Ok(Self::Discord),
            "log" => Ok(Self::Log),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}

/// A configured notification destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    /// Channel type.
    pub kind: ChannelKind,
    /// Address, number or webhook URL.
    pub target: String,
    /// Whether the user enabled this channel.
    pub enabled: bool,
}

impl NotificationChannel {
    /// Create an enabled channel.
    #[must_use]
    pub fn new(kind: ChannelKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            enabled: true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
