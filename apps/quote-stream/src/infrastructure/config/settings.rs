//! Engine Configuration Settings
//!
//! Configuration types for the quote stream service, loaded from
//! environment variables.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::application::ports::{MarketDataSettings, UserSettings};
use crate::application::services::{EngineSettings, RouterConfig, SessionConfig};
use crate::domain::alert::{Alert, AlertCondition, AlertId};
use crate::domain::market::Symbol;
use crate::domain::notification::{ChannelKind, NotificationChannel};
use crate::infrastructure::provider::SimulatedConfig;

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP/WebSocket server port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Outbound (to client) queue capacity.
    pub outbound_capacity: usize,
    /// Upstream (from provider) queue capacity.
    pub upstream_capacity: usize,
    /// Upper bound on one client write.
    pub write_timeout: Duration,
    /// Interval between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Client silence tolerated before the session ends.
    pub idle_timeout: Duration,
    /// Upper bound on flushing queued events when a session ends.
    pub flush_timeout: Duration,
    /// Upper bound on draining sessions at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            upstream_capacity: 256,
            write_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            flush_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            outbound_capacity: settings.outbound_capacity,
            upstream_capacity: settings.upstream_capacity,
            write_timeout: settings.write_timeout,
            heartbeat_interval: settings.heartbeat_interval,
            idle_timeout: settings.idle_timeout,
            flush_timeout: settings.flush_timeout,
        }
    }
}

/// Router settings.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Shared evaluator queue capacity.
    pub evaluator_capacity: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            evaluator_capacity: 4_096,
        }
    }
}

/// Alert polling settings.
#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// Whether the background poller runs.
    pub polling_enabled: bool,
    /// Time between polls.
    pub poll_interval: Duration,
    /// Alerts loaded into the in-memory store at startup.
    pub seed: Vec<Alert>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            polling_enabled: true,
            poll_interval: Duration::from_secs(60),
            seed: Vec::new(),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Per-session settings.
    pub session: SessionSettings,
    /// Router settings.
    pub router: RouterSettings,
    /// Alert polling settings.
    pub alerts: AlertSettings,
    /// Simulated provider settings.
    pub simulated: SimulatedConfig,
    /// Initial user settings for the in-memory config store.
    pub user: UserSettings,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a notification channel or seed alert is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a notification channel or seed alert is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let server = ServerSettings {
            http_port: env.u16("QUOTE_STREAM_HTTP_PORT", ServerSettings::default().http_port),
        };

        let defaults = SessionSettings::default();
        let session = SessionSettings {
            outbound_capacity: env.usize(
                "QUOTE_STREAM_OUTBOUND_CAPACITY",
                defaults.outbound_capacity,
            ),
            upstream_capacity: env.usize(
                "QUOTE_STREAM_UPSTREAM_CAPACITY",
                defaults.upstream_capacity,
            ),
            write_timeout: env.duration_secs(
                "QUOTE_STREAM_WRITE_TIMEOUT_SECS",
                defaults.write_timeout,
            ),
            heartbeat_interval: env.duration_secs(
                "QUOTE_STREAM_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            idle_timeout: env.duration_secs("QUOTE_STREAM_IDLE_TIMEOUT_SECS", defaults.idle_timeout),
            flush_timeout: env.duration_secs(
                "QUOTE_STREAM_FLUSH_TIMEOUT_SECS",
                defaults.flush_timeout,
            ),
            shutdown_grace: env.duration_secs(
                "QUOTE_STREAM_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace,
            ),
        };

        let router = RouterSettings {
            evaluator_capacity: env.usize(
                "QUOTE_STREAM_EVALUATOR_CAPACITY",
                RouterSettings::default().evaluator_capacity,
            ),
        };

        let alerts = AlertSettings {
            polling_enabled: env.bool(
                "QUOTE_STREAM_ALERT_POLLING",
                AlertSettings::default().polling_enabled,
            ),
            poll_interval: env.duration_secs(
                "QUOTE_STREAM_ALERT_POLL_SECS",
                AlertSettings::default().poll_interval,
            ),
            seed: env
                .get("SEED_ALERTS")
                .map(|raw| parse_alerts(&raw))
                .transpose()?
                .unwrap_or_default(),
        };

        let simulated = SimulatedConfig {
            tick_interval: env.duration_millis(
                "QUOTE_STREAM_SIM_TICK_MS",
                SimulatedConfig::default().tick_interval,
            ),
            ..SimulatedConfig::default()
        };

        let user = UserSettings {
            tracked_symbols: env
                .get("TRACKED_SYMBOLS")
                .map(|raw| split_list(&raw).map(str::to_string).collect())
                .unwrap_or_default(),
            market_data: MarketDataSettings {
                provider: env
                    .get("MARKET_DATA_PROVIDER")
                    .unwrap_or_else(|| "simulated".to_string()),
                api_key: env.get("MARKET_DATA_API_KEY"),
            },
            notification_channels: env
                .get("NOTIFICATION_CHANNELS")
                .map(|raw| parse_channels(&raw))
                .transpose()?
                .unwrap_or_default(),
        };

        Ok(Self {
            server,
            session,
            router,
            alerts,
            simulated,
            user,
        })
    }

    /// Engine tuning derived from this configuration.
    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            session: SessionConfig::from(&self.session),
            router: RouterConfig {
                evaluator_capacity: self.router.evaluator_capacity,
            },
            poll_interval: self
                .alerts
                .polling_enabled
                .then_some(self.alerts.poll_interval),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A notification channel entry is malformed.
    #[error("invalid notification channel '{0}': expected kind:target")]
    InvalidChannel(String),
    /// A notification channel names an unknown kind.
    #[error(transparent)]
    UnknownChannel(#[from] crate::domain::notification::UnknownChannel),
    /// A seed alert entry is malformed.
    #[error("invalid alert '{0}': expected SYMBOL:above|below:PRICE")]
    InvalidAlert(String),
}

// =============================================================================
// List Parsing
// =============================================================================

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parse `kind:target` pairs, e.g. `email:ops@example.com,log:stdout`.
fn parse_channels(raw: &str) -> Result<Vec<NotificationChannel>, ConfigError> {
    split_list(raw)
        .map(|entry| {
            let (kind, target) = entry
                .split_once(':')
                .ok_or_else(|| ConfigError::InvalidChannel(entry.to_string()))?;
            let target = target.trim();
            if target.is_empty() {
                return Err(ConfigError::InvalidChannel(entry.to_string()));
            }
            Ok(NotificationChannel::new(ChannelKind::from_str(kind)?, target))
        })
        .collect()
}

/// Parse `SYMBOL:condition:price` triples. Ids are assigned in order from 1.
fn parse_alerts(raw: &str) -> Result<Vec<Alert>, ConfigError> {
    split_list(raw)
        .zip(1..)
        .map(|(entry, id): (&str, AlertId)| {
            let invalid = || ConfigError::InvalidAlert(entry.to_string());
            let mut parts = entry.split(':');
            let symbol = parts.next().and_then(Symbol::parse).ok_or_else(invalid)?;
            let condition = parts
                .next()
                .and_then(|c| AlertCondition::from_str(c).ok())
                .ok_or_else(invalid)?;
            let threshold = parts
                .next()
                .and_then(|p| Decimal::from_str(p.trim()).ok())
                .ok_or_else(invalid)?;
            if parts.next().is_some() {
                return Err(invalid());
            }
            Ok(Alert::new(id, symbol, condition, threshold))
        })
        .collect()
}

// =============================================================================
// Environment Helpers
// =============================================================================

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn u16(&self, key: &str, default: u16) -> u16 {
        self.parse(key).unwrap_or(default)
    }

    /// Capacities and periods must be non-zero; zero falls back like garbage.
    fn usize(&self, key: &str, default: usize) -> usize {
        self.parse(key).filter(|v| *v > 0).unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map_or(default, |v| !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no"))
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key)
            .filter(|v| *v > 0)
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key)
            .filter(|v| *v > 0)
            .map_or(default, Duration::from_millis)
    }
}
