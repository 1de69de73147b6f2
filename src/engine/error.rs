//! Engine error taxonomy

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::lifecycle::{LifecycleAction, LifecycleError};
use crate::lineage::LineageError;
use crate::types::{CellStatus, ImpactType};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Rule catalog unavailable: {0}")]
    CatalogUnavailable(#[source] CatalogError),

    #[error("Rule catalog not loaded")]
    NotInitialized,

    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    #[error("Patch for rule {rule_id} rejected: {}", .reasons.join("; "))]
    InvalidPatch { rule_id: String, reasons: Vec<String> },

    #[error("Cell {active} is already active, cannot activate {requested}")]
    UnitAlreadyActive { active: String, requested: String },

    #[error("Unknown cell: {0}")]
    UnknownCell(String),

    #[error("Cell {cell} cannot {action} from {from}")]
    InvalidTransition {
        cell: String,
        from: CellStatus,
        action: LifecycleAction,
    },

    #[error("Cell {cell} has {alarms} active alarm(s), rework it before approval")]
    AlarmBlocking { cell: String, alarms: usize },

    #[error("No active cell")]
    NoActiveUnit,

    #[error("Alarm not found: {0}")]
    AlarmNotFound(String),

    #[error("Impact not found: {kind}/{id}")]
    ImpactNotFound { kind: ImpactType, id: String },

    #[error("Lineage incomplete for batch {0}")]
    LineageIncomplete(String),

    #[error("Lineage error: {0}")]
    Lineage(#[source] LineageError),

    #[error("Engine stopped")]
    EngineStopped,
}

impl From<CatalogError> for EngineError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotInitialized => EngineError::NotInitialized,
            CatalogError::UnknownRule(id) => EngineError::UnknownRule(id),
            CatalogError::InvalidPatch { rule_id, reasons } => {
                EngineError::InvalidPatch { rule_id, reasons }
            }
            other => EngineError::CatalogUnavailable(other),
        }
    }
}

impl From<LifecycleError> for EngineError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::UnknownCell(id) => EngineError::UnknownCell(id),
            LifecycleError::UnitAlreadyActive { active, requested } => {
                EngineError::UnitAlreadyActive { active, requested }
            }
            LifecycleError::InvalidTransition { cell, from, action } => {
                EngineError::InvalidTransition { cell, from, action }
            }
            LifecycleError::AlarmBlocking(cell) => EngineError::AlarmBlocking { cell, alarms: 0 },
            LifecycleError::NoActiveUnit => EngineError::NoActiveUnit,
        }
    }
}

impl From<LineageError> for EngineError {
    fn from(e: LineageError) -> Self {
        match e {
            LineageError::Incomplete { batch_id } => EngineError::LineageIncomplete(batch_id),
            other => EngineError::Lineage(other),
        }
    }
}
