//! In-memory store adapters.
//!
//! Used by the binary's default wiring and by tests. A persistent backend
//! would implement the same ports.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::application::ports::{AlertStore, ConfigStore, StoreError, TriggerOutcome, UserSettings};
use crate::domain::alert::{Alert, AlertId};

// =============================================================================
// Alert Store
// =============================================================================

/// Alert store held in memory.
///
/// `trigger_alert` checks and flips the active flag under one write lock,
/// which makes it compare-and-set.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: RwLock<BTreeMap<AlertId, Alert>>,
}

impl InMemoryAlertStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `alerts`.
    #[must_use]
    pub fn with_alerts(alerts: impl IntoIterator<Item = Alert>) -> Self {
        let store = Self::new();
        for alert in alerts {
            store.upsert(alert);
        }
        store
    }

    /// Insert or replace an alert.
    pub fn upsert(&self, alert: Alert) {
        self.alerts.write().insert(alert.id, alert);
    }

    /// Get an alert by id.
    #[must_use]
    pub fn get(&self, id: AlertId) -> Option<Alert> {
        self.alerts.read().get(&id).cloned()
    }

    /// Re-arm a triggered alert.
    ///
    /// Returns `false` if the alert does not exist.
    pub fn reset(&self, id: AlertId) -> bool {
        match self.alerts.write().get_mut(&id) {
            Some(alert) => {
                alert.active = true;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .alerts
            .read()
            .values()
            .filter(|a| a.active)
            .cloned()
            .collect())
    }

    async fn trigger_alert(&self, id: AlertId) -> Result<TriggerOutcome, StoreError> {
        let mut alerts = self.alerts.write();
        let alert = alerts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !alert.active {
            return Ok(TriggerOutcome::AlreadyTriggered);
        }
        alert.active = false;
        alert.triggered_at = Some(Utc::now());
        Ok(TriggerOutcome::Triggered)
    }
}

// =============================================================================
// Config Store
// =============================================================================

/// User settings held in memory.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    settings: RwLock<UserSettings>,
}

impl InMemoryConfigStore {
    /// Create a store holding `settings`.
    #[must_use]
    pub fn new(settings: UserSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Replace the settings. Running sessions keep their snapshot.
    pub fn replace(&self, settings: UserSettings) {
        *self.settings.write() = settings;
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&self) -> Result<UserSettings, StoreError> {
        Ok(self.settings.read().clone())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::alert::AlertCondition;
    use crate::domain::market::Symbol;

    fn alert(id: AlertId) -> Alert {
        Alert::new(id, Symbol::new("ACME"), AlertCondition::Below, Decimal::new(9_000, 2))
    }

    #[tokio::test]
    async fn trigger_is_compare_and_set() {
        let store = InMemoryAlertStore::with_alerts([alert(1)]);

        assert_eq!(store.trigger_alert(1).await.unwrap(), TriggerOutcome::Triggered);
        assert_eq!(
            store.trigger_alert(1).await.unwrap(),
            TriggerOutcome::AlreadyTriggered
        );

        let stored = store.get(1).unwrap();
        assert!(!stored.active);
        assert!(stored.triggered_at.is_some());
        assert!(store.active_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_alert_is_not_found() {
        let store = InMemoryAlertStore::new();
        assert!(matches!(
            store.trigger_alert(99).await,
            Err(StoreError::NotFound(99))
        ));
    }

    #[tokio::test]
    async fn reset_rearms_alert() {
        let store = InMemoryAlertStore::with_alerts([alert(1)]);
        store.trigger_alert(1).await.unwrap();

        assert!(store.reset(1));
        assert_eq!(store.active_alerts().await.unwrap().len(), 1);
        assert!(!store.reset(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_have_one_winner() {
        let store = Arc::new(InMemoryAlertStore::with_alerts([alert(1)]));
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.trigger_alert(1).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() == TriggerOutcome::Triggered {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn config_replace_is_visible_to_next_load() {
        let store = InMemoryConfigStore::default();
        assert!(store.load().await.unwrap().tracked_symbols.is_empty());

        store.replace(UserSettings {
            tracked_symbols: vec!["acme".to_string()],
            ..UserSettings::default()
        });
        assert_eq!(store.load().await.unwrap().tracked_symbols, vec!["acme"]);
    }
}
