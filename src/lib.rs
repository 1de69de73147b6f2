//! Pourwatch: Concrete Pour Quality Monitoring
//!
//! Rule-driven monitoring of a block/lift pour grid. Each cell walks through
//! the process stages, the active stage's catalog rules are evaluated against
//! live metrics, and failures raise alarms and derived downstream impacts
//! traced back to the batch, material lot and vendor.
//!
//! ## Architecture
//!
//! - **Catalog**: loads and validates the JSON rule catalog, supports live patches
//! - **Evaluator**: pure rule evaluation against a metrics snapshot
//! - **Lineage**: rotating batch pool and pour → batch → lot → vendor traces
//! - **Lifecycle**: per-cell state machine and stage progression
//! - **Impact**: alarm construction and downstream impact derivation
//! - **Engine**: single-writer actor that applies operator commands and
//!   drives timed auto-advance

pub mod config;
pub mod types;
pub mod catalog;
pub mod evaluator;
pub mod lineage;
pub mod lifecycle;
pub mod impact;
pub mod engine;

// Re-export plant configuration
pub use config::PlantConfig;

// Re-export the catalog and engine entry points
pub use catalog::{CatalogError, CatalogSource, FileCatalogSource, RuleCatalog, StaticCatalogSource};
pub use engine::{
    Clock, Engine, EngineActor, EngineError, EngineHandle, EngineSettings, FixedClock,
    OperatorCommand, SystemClock,
};
pub use lineage::readings::{FixedReadings, RandomReadings, ReadingSource};
pub use lineage::ReferenceTables;

// Re-export commonly used types
pub use types::{
    AlarmEvent, BlockLiftCell, CellStatus, EngineSnapshot, FlowState, ImpactEvent, ImpactType,
    MetricKey, MetricsInput, ProcessStage, RuleDescriptor, RulePatch, Severity, TraceChain,
};
