//! Plant Configuration Module
//!
//! Provides per-plant configuration loaded from TOML files.
//!
//! ## Loading Order
//!
//! 1. `POURWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `pourwatch.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The binary calls `config::init()` once at startup and reads it back with
//! `config::get()`. Library types take the values they need explicitly
//! (see `EngineSettings::from_config`).
//!
//! ```ignore
//! config::init(PlantConfig::load());
//! let blocks = config::get().plant.blocks;
//! ```

mod plant_config;
pub mod defaults;
pub mod validation;

pub use plant_config::*;

use std::sync::OnceLock;

/// Global plant configuration, initialized once at startup.
static PLANT_CONFIG: OnceLock<PlantConfig> = OnceLock::new();

/// Initialize the global plant configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: PlantConfig) {
    if PLANT_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global plant configuration, or the built-in defaults if
/// `init()` has not been called.
pub fn get() -> &'static PlantConfig {
    PLANT_CONFIG.get_or_init(|| {
        tracing::debug!("config::get() before init(), using defaults");
        PlantConfig::default()
    })
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    PLANT_CONFIG.get().is_some()
}
