//! Plant Config Loading Tests
//!
//! Exercises TOML loading from disk, defaulted sections, range validation and
//! the mapping from config to engine settings.

use std::io::Write;
use std::time::Duration;

use pourwatch::config::{ConfigError, PlantConfig};
use pourwatch::engine::EngineSettings;

fn write_config(toml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(toml.as_bytes()).expect("write config");
    file
}

#[test]
fn partial_file_keeps_defaults_for_missing_sections() {
    let file = write_config(
        r#"
[plant]
name = "Lower Dam"
blocks = 3
lifts = 5

[lifecycle]
dwell_secs = 0.5
"#,
    );
    let config = PlantConfig::load_from_file(file.path()).expect("loads");
    let defaults = PlantConfig::default();

    assert_eq!(config.plant.name, "Lower Dam");
    assert_eq!(config.cell_count(), 15);
    assert!((config.lifecycle.dwell_secs - 0.5).abs() < f64::EPSILON);
    assert_eq!(config.lifecycle.auto_advance, defaults.lifecycle.auto_advance);
    assert_eq!(config.lineage, defaults.lineage);
    assert_eq!(config.catalog, defaults.catalog);
}

#[test]
fn settings_follow_config() {
    let file = write_config(
        r#"
[plant]
blocks = 2
lifts = 6

[lifecycle]
dwell_secs = 1.5
auto_advance = true

[lineage]
batch_pool_size = 3

[evaluation]
strict_missing_metrics = true
"#,
    );
    let config = PlantConfig::load_from_file(file.path()).expect("loads");
    let settings = EngineSettings::from_config(&config);

    assert_eq!(settings.blocks, 2);
    assert_eq!(settings.lifts, 6);
    assert_eq!(settings.batch_pool_size, 3);
    assert_eq!(settings.dwell, Duration::from_millis(1500));
    assert!(settings.auto_advance);
    assert!(settings.strict_missing_metrics);
}

#[test]
fn typos_warn_but_still_load() {
    let file = write_config("[plant]\nnaem = \"Typo Dam\"\nblocks = 2\n");
    let config = PlantConfig::load_from_file(file.path()).expect("unknown keys are not fatal");
    assert_eq!(config.plant.blocks, 2);
    assert_eq!(config.plant.name, PlantConfig::default().plant.name);
}

#[test]
fn every_range_error_is_reported() {
    let file = write_config(
        r#"
[plant]
blocks = 0

[lifecycle]
dwell_secs = -1.0

[lineage]
batch_pool_size = 0
"#,
    );
    match PlantConfig::load_from_file(file.path()) {
        Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3, "{errors:?}"),
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[test]
fn parse_error_names_the_file() {
    let file = write_config("[plant\nblocks = 2\n");
    match PlantConfig::load_from_file(file.path()) {
        Err(e @ ConfigError::Parse(..)) => {
            let message = e.to_string();
            assert!(message.contains(&file.path().display().to_string()), "{message}");
        }
        other => panic!("expected Parse, got {other:?}"),
    }
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    assert!(matches!(
        PlantConfig::load_from_file(&dir.path().join("pourwatch.toml")),
        Err(ConfigError::Io(..))
    ));
}

#[test]
fn serialized_config_loads_back() {
    let mut config = PlantConfig::default();
    config.plant.name = "Round Trip Dam".to_string();
    config.simulation.seed = Some(99);
    let file = write_config(&config.to_toml().expect("serializes"));
    assert_eq!(PlantConfig::load_from_file(file.path()).expect("loads"), config);
}

#[test]
fn search_order_skips_a_stale_env_path() {
    // Only test in this binary that touches the environment
    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var("POURWATCH_CONFIG", dir.path().join("gone.toml"));
    assert_eq!(PlantConfig::load(), PlantConfig::default());

    let broken = write_config("[plant]\nblocks = 0\n");
    std::env::set_var("POURWATCH_CONFIG", broken.path());
    assert_eq!(PlantConfig::load(), PlantConfig::default());

    let good = write_config("[plant]\nname = \"Env Dam\"\n");
    std::env::set_var("POURWATCH_CONFIG", good.path());
    assert_eq!(PlantConfig::load().plant.name, "Env Dam");

    std::env::remove_var("POURWATCH_CONFIG");
}
