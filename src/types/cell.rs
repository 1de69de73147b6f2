//! Work unit types: CellStatus, BlockLiftCell

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a block/lift cell
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    #[default]
    Pending,
    InProgress,
    Awaiting,
    Alarm,
    Approved,
    Rejected,
}

impl CellStatus {
    /// Approved and rejected end a production cycle
    pub fn is_terminal(self) -> bool {
        matches!(self, CellStatus::Approved | CellStatus::Rejected)
    }

    /// States that hold the single active-unit slot
    pub fn is_active(self) -> bool {
        matches!(
            self,
            CellStatus::InProgress | CellStatus::Awaiting | CellStatus::Alarm
        )
    }
}

impl std::fmt::Display for CellStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellStatus::Pending => write!(f, "pending"),
            CellStatus::InProgress => write!(f, "in_progress"),
            CellStatus::Awaiting => write!(f, "awaiting"),
            CellStatus::Alarm => write!(f, "alarm"),
            CellStatus::Approved => write!(f, "approved"),
            CellStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// One monitored work unit, identified by (block, lift)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockLiftCell {
    pub id: String,
    pub block: u32,
    pub lift: u32,
    pub status: CellStatus,
    pub approved: bool,
    /// When the next auto-advance step is due, if one is scheduled
    pub ready_at: Option<DateTime<Utc>>,
}

impl BlockLiftCell {
    pub fn new(block: u32, lift: u32) -> Self {
        Self {
            id: Self::make_id(block, lift),
            block,
            lift,
            status: CellStatus::Pending,
            approved: false,
            ready_at: None,
        }
    }

    /// Canonical id, e.g. `B03-L07`
    pub fn make_id(block: u32, lift: u32) -> String {
        format!("B{:02}-L{:02}", block, lift)
    }

    /// Operator-facing label, e.g. `Block 3 · Lift 7`
    pub fn label(&self) -> String {
        format!("Block {} · Lift {}", self.block, self.lift)
    }
}
