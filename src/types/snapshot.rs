//! Snapshot output consumed by UI and telemetry surfaces

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    AlarmEvent, BlockLiftCell, CellStatus, ImpactEvent, ImpactType, ProcessStage, RuleResult,
    Severity, TraceChain,
};

/// Banner / flow state shown to operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlowState {
    #[default]
    Idle,
    Monitoring,
    Accepted,
    Rejected,
    Alert,
}

impl FlowState {
    /// Flow state for the status of the focused cell
    pub fn for_status(status: Option<CellStatus>) -> Self {
        match status {
            None | Some(CellStatus::Pending) => FlowState::Idle,
            Some(CellStatus::InProgress) | Some(CellStatus::Awaiting) => FlowState::Monitoring,
            Some(CellStatus::Approved) => FlowState::Accepted,
            Some(CellStatus::Rejected) => FlowState::Rejected,
            Some(CellStatus::Alarm) => FlowState::Alert,
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowState::Idle => write!(f, "IDLE"),
            FlowState::Monitoring => write!(f, "MONITORING"),
            FlowState::Accepted => write!(f, "ACCEPTED"),
            FlowState::Rejected => write!(f, "REJECTED"),
            FlowState::Alert => write!(f, "ALERT"),
        }
    }
}

/// Banner content: flow state plus the rule driving it while in alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Banner {
    pub state: FlowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline_rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub message: String,
}

/// Full engine state as published after every command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub generated_at: DateTime<Utc>,
    pub banner: Banner,
    pub auto_advance: bool,
    pub active_cell_id: Option<String>,
    pub active_stage: Option<ProcessStage>,
    pub cells: Vec<BlockLiftCell>,
    pub alarms: Vec<AlarmEvent>,
    pub impacts: BTreeMap<ImpactType, Vec<ImpactEvent>>,
    pub trace: Option<TraceChain>,
    pub last_results: Vec<RuleResult>,
}

impl EngineSnapshot {
    /// Look up a cell by id
    pub fn cell(&self, id: &str) -> Option<&BlockLiftCell> {
        self.cells.iter().find(|c| c.id == id)
    }

    /// Total number of active impacts across all types
    pub fn impact_count(&self) -> usize {
        self.impacts.values().map(Vec::len).sum()
    }
}
