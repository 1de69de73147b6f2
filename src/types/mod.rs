//! Shared data structures for the pour monitoring engine
//!
//! This module defines the core types that flow between components:
//! - Rule catalog: RuleDescriptor, ConditionOperator, MetricKey, RulePatch
//! - Telemetry: MetricsSnapshot (metrics map + reference clock + context)
//! - Lineage: Vendor, MaterialLot, Batch, Pour, TraceChain
//! - Work units: BlockLiftCell, CellStatus
//! - Outputs: RuleResult, AlarmEvent, ImpactEvent, EngineSnapshot

mod rules;
mod telemetry;
mod lineage;
mod cell;
mod events;
mod snapshot;

pub use rules::*;
pub use telemetry::*;
pub use lineage::*;
pub use cell::*;
pub use events::*;
pub use snapshot::*;
