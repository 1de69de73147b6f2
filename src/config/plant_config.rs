//! Plant Configuration - grid size, catalog location and engine tuning as TOML
//!
//! Every section is optional. Each struct implements `Default` with the
//! values in [`super::defaults`], so an empty file (or no file) yields a
//! working demo plant.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::{defaults, validation};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one monitored plant.
///
/// Load with `PlantConfig::load()` which searches:
/// 1. `$POURWATCH_CONFIG` env var
/// 2. `./pourwatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlantConfig {
    /// Plant identification and grid dimensions
    #[serde(default)]
    pub plant: PlantInfo,

    /// Rule catalog location
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Unit lifecycle timing
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Batch pool and reference tables
    #[serde(default)]
    pub lineage: LineageConfig,

    /// Rule evaluation policy
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Synthesized readings
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl PlantConfig {
    /// Load the first usable config in search order, falling back to the
    /// built-in defaults. Missing or broken files are logged and skipped.
    pub fn load() -> Self {
        let from_env = std::env::var_os(defaults::CONFIG_ENV_VAR).map(PathBuf::from);
        let candidates = from_env
            .iter()
            .map(|p| (p.as_path(), true))
            .chain(std::iter::once((Path::new(defaults::LOCAL_CONFIG_FILE), false)));

        for (path, named_by_env) in candidates {
            if !path.exists() {
                if named_by_env {
                    warn!(path = %path.display(), "{} names a missing file, falling back", defaults::CONFIG_ENV_VAR);
                }
                continue;
            }
            match Self::load_from_file(path) {
                Ok(config) => {
                    info!(path = %path.display(), plant = %config.plant.name, "Loaded plant config");
                    return config;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unusable plant config"),
            }
        }

        info!("No plant config found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::parse(&contents, path)
    }

    /// Parse and validate an in-memory TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, Path::new("<inline>"))
    }

    fn parse(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let parse_error = |e: toml::de::Error| ConfigError::Parse(origin.to_path_buf(), e);

        let doc: toml::Table = contents.parse().map_err(parse_error)?;
        for key in validation::unknown_keys(&doc) {
            warn!(file = %origin.display(), "{key}");
        }

        let config: Self = toml::from_str(contents).map_err(parse_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check value ranges, reporting every error at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let report = validation::check_ranges(self);
        for warning in &report.warnings {
            warn!("{warning}");
        }
        if report.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(report.errors))
        }
    }

    /// Total number of cells in the grid
    pub fn cell_count(&self) -> u64 {
        u64::from(self.plant.blocks) * u64::from(self.plant.lifts)
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Invalid TOML in {}: {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config values out of range: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Plant Info
// ============================================================================

/// Identification and grid dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantInfo {
    /// Plant / structure name, used in logs
    #[serde(default = "default_plant_name")]
    pub name: String,

    /// Number of blocks (grid columns)
    #[serde(default = "default_blocks")]
    pub blocks: u32,

    /// Number of lifts per block (grid rows)
    #[serde(default = "default_lifts")]
    pub lifts: u32,
}

fn default_plant_name() -> String {
    defaults::PLANT_NAME.to_string()
}
fn default_blocks() -> u32 {
    defaults::BLOCKS
}
fn default_lifts() -> u32 {
    defaults::LIFTS
}

impl Default for PlantInfo {
    fn default() -> Self {
        Self {
            name: default_plant_name(),
            blocks: default_blocks(),
            lifts: default_lifts(),
        }
    }
}

// ============================================================================
// Catalog Config
// ============================================================================

/// Where the rule catalog is read from. No path means the bundled catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// ============================================================================
// Lifecycle Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Seconds between automatic steps when auto-advance is on
    #[serde(default = "default_dwell_secs")]
    pub dwell_secs: f64,

    /// Start with auto-advance enabled
    #[serde(default)]
    pub auto_advance: bool,
}

fn default_dwell_secs() -> f64 {
    defaults::DWELL_SECS
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            dwell_secs: default_dwell_secs(),
            auto_advance: false,
        }
    }
}

// ============================================================================
// Lineage Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageConfig {
    /// Number of batches in the rotating pool
    #[serde(default = "default_batch_pool_size")]
    pub batch_pool_size: usize,

    /// JSON file with `vendors` and `lots` arrays. Built-in tables when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_path: Option<PathBuf>,
}

fn default_batch_pool_size() -> usize {
    defaults::BATCH_POOL_SIZE
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            batch_pool_size: default_batch_pool_size(),
            reference_path: None,
        }
    }
}

// ============================================================================
// Evaluation Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Fail rules whose metric is neither reported nor derivable
    #[serde(default)]
    pub strict_missing_metrics: bool,
}

// ============================================================================
// Simulation Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed for reproducible readings. Random seed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = PlantConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: PlantConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config, PlantConfig::default());
        assert_eq!(config.plant.blocks, defaults::BLOCKS);
        assert_eq!(config.lineage.batch_pool_size, defaults::BATCH_POOL_SIZE);
        assert!(!config.evaluation.strict_missing_metrics);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[plant]
name = "Upper Dam"
blocks = 2

[evaluation]
strict_missing_metrics = true

[simulation]
seed = 99
"#;
        let config = PlantConfig::from_toml_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.plant.name, "Upper Dam");
        assert_eq!(config.plant.blocks, 2);
        assert_eq!(config.plant.lifts, defaults::LIFTS);
        assert!(config.evaluation.strict_missing_metrics);
        assert_eq!(config.simulation.seed, Some(99));
        assert!(config.catalog.path.is_none());
    }

    #[test]
    fn test_validation_rejects_zero_grid() {
        let mut config = PlantConfig::default();
        config.plant.blocks = 0;
        config.lineage.batch_pool_size = 0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("plant.blocks")));
                assert!(errors.iter().any(|e| e.contains("lineage.batch_pool_size")));
            }
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = PlantConfig::default();
        config.catalog.path = Some(PathBuf::from("rules/site.json"));
        config.lifecycle.auto_advance = true;
        let text = config.to_toml().expect("serialize");
        let back = PlantConfig::from_toml_str(&text).expect("parse back");
        assert_eq!(back, config);
    }

    #[test]
    fn test_load_from_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pourwatch.toml");
        std::fs::write(&path, "[plant]\nblocks = \"many\"\n").expect("write");
        match PlantConfig::load_from_file(&path) {
            Err(ConfigError::Parse(p, _)) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
