//! Configuration Module
//!
//! Configuration loading for the quote stream service.

mod settings;

pub use settings::{
    AlertSettings, ConfigError, EngineConfig, RouterSettings, ServerSettings, SessionSettings,
};
