//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Config Loading
// ============================================================================

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "POURWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "pourwatch.toml";

// ============================================================================
// Plant Grid
// ============================================================================

pub const PLANT_NAME: &str = "Demo Dam";

/// Blocks in the default grid.
pub const BLOCKS: u32 = 4;

/// Lifts per block in the default grid.
pub const LIFTS: u32 = 8;

/// Upper bound on blocks × lifts.
pub const MAX_GRID_CELLS: u32 = 10_000;

// ============================================================================
// Lifecycle
// ============================================================================

/// Delay between automatic steps (seconds).
pub const DWELL_SECS: f64 = 5.0;

/// Dwell above this is accepted but logged as suspicious (seconds).
pub const MAX_DWELL_SECS: f64 = 3_600.0;

// ============================================================================
// Lineage
// ============================================================================

/// Batches in the rotating pool.
pub const BATCH_POOL_SIZE: usize = 6;

// ============================================================================
// Engine
// ============================================================================

/// Capacity of the engine actor's command mailbox.
pub const ENGINE_MAILBOX_CAPACITY: usize = 100;
