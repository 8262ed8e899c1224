//! Alert Store Port (Driven Port)
//!
//! Interface to the external alert store. The engine never creates or
//! deletes alerts; it reads the armed ones and flags them as triggered.

use async_trait::async_trait;

use crate::domain::alert::{Alert, AlertId};

/// Alert store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The alert no longer exists.
    #[error("alert not found: {0}")]
    NotFound(AlertId),
}

/// Result of a trigger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// This call flipped the alert from active to triggered.
    Triggered,
    /// Another caller already triggered the alert; nothing changed.
    AlreadyTriggered,
}

/// Port for alert reads and the trigger mutation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Get every alert that is currently armed.
    async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError>;

    /// Flag an alert as triggered.
    ///
    /// Must be compare-and-set: of two concurrent calls for the same id,
    /// exactly one observes [`TriggerOutcome::Triggered`].
    async fn trigger_alert(&self, id: AlertId) -> Result<TriggerOutcome, StoreError>;
}
