//! Market Data Provider Adapters
//!
//! - [`ProviderRegistry`]: name-keyed [`MarketDataProviderFactory`]
//! - [`SimulatedProvider`]: random-walk quotes, no vendor required
//! - [`ScriptedProvider`]: test provider fed by hand

mod scripted;
mod simulated;

use std::collections::HashMap;
use std::sync::Arc;

pub use scripted::ScriptedProvider;
pub use simulated::{SimulatedConfig, SimulatedProvider};

use crate::application::ports::{
    MarketDataProvider, MarketDataProviderFactory, MarketDataSettings, ProviderError,
};

/// Builds a provider from its settings.
pub type ProviderBuilder = Arc<
    dyn Fn(&MarketDataSettings) -> Result<Arc<dyn MarketDataProvider>, ProviderError>
        + Send
        + Sync,
>;

/// Provider factory keyed on the configured provider name.
///
/// Names are matched case-insensitively.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    builders: HashMap<String, ProviderBuilder>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `simulated` provider.
    #[must_use]
    pub fn with_simulated(config: SimulatedConfig) -> Self {
        let mut registry = Self::new();
        registry.register("simulated", move |_| {
            Ok(Arc::new(SimulatedProvider::new(config)) as Arc<dyn MarketDataProvider>)
        });
        registry
    }

    /// Register a builder under `name`.
    pub fn register<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(&MarketDataSettings) -> Result<Arc<dyn MarketDataProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.builders
            .insert(name.trim().to_lowercase(), Arc::new(builder));
    }

    /// Register a shared provider instance under `name`.
    pub fn register_instance(&mut self, name: &str, provider: Arc<dyn MarketDataProvider>) {
        self.register(name, move |_| Ok(Arc::clone(&provider)));
    }

    /// Registered provider names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.builders.keys().cloned().collect();
        names.sort();
        names
    }
}

impl MarketDataProviderFactory for ProviderRegistry {
    fn create(
        &self,
        settings: &MarketDataSettings,
    ) -> Result<Arc<dyn MarketDataProvider>, ProviderError> {
        let key = settings.provider.trim().to_lowercase();
        let builder = self
            .builders
            .get(&key)
            .ok_or_else(|| ProviderError::UnknownProvider(settings.provider.clone()))?;
        builder(settings)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
