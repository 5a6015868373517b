//! # Configuration Modules
//!
//! Run configuration for the traffic fetcher: built-in defaults, an optional
//! JSON file and command line / environment overrides, resolved once into an
//! immutable [`config_traffic::TrafficConfig`].

/// Layered traffic run configuration.
pub mod config_traffic;

pub use config_traffic::{
    config_source, load_config, ConfigError, ConfigLayer, DatasetDescriptor, RawNaming, TrafficConfig,
    DEFAULT_CONFIG_FILE,
};
