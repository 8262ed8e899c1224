//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketDataProvider`: Quotes, candles and continuous quote streams
//! - `AlertStore`: Active alert reads and the trigger mutation
//! - `NotificationDispatcher`: Delivery to the user's channels
//! - `ConfigStore`: Tracked symbols, provider selection, channels
//!
//! ## Driver Ports (Inbound)
//!
//! - `TransportWriter` / `TransportReader`: The two halves of a client
//!   connection handed to a stream session

mod alert_store_port;
mod config_port;
mod market_data_port;
mod notification_port;
mod transport_port;

#[cfg(test)]
pub use alert_store_port::MockAlertStore;
pub use alert_store_port::{AlertStore, StoreError, TriggerOutcome};
pub use config_port::{ConfigStore, MarketDataSettings, UserSettings};
pub use market_data_port::{MarketDataProvider, MarketDataProviderFactory, ProviderError};
#[cfg(test)]
pub use notification_port::MockNotificationDispatcher;
pub use notification_port::NotificationDispatcher;
pub use transport_port::{
    Connection, Inbound, SessionEvent, TransportError, TransportReader, TransportWriter,
};
