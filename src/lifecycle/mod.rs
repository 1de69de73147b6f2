//! Unit Lifecycle State Machine
//!
//! Owns the block × lift grid and the status of every cell.
//!
//! ```text
//! pending ──select──▶ in_progress ──stages pass──▶ awaiting ──approve──▶ approved
//!    ▲                     │                          │
//!    │                     └────────fail──────┬───────┘
//!    │                                        ▼
//!    └──────rework────── rejected ◀──reject── alarm
//! ```
//!
//! Only one cell holds the active slot (in_progress, awaiting or alarm) at a
//! time. The last selected cell stays focused after it reaches a terminal
//! state so operator commands without a cell id (reject, rework) still have a
//! target. Rework can also name any rejected cell directly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::types::{BlockLiftCell, CellStatus, ProcessStage};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Unknown cell: {0}")]
    UnknownCell(String),

    #[error("Cell {active} is already active, cannot activate {requested}")]
    UnitAlreadyActive { active: String, requested: String },

    #[error("Cell {cell} cannot {action} from {from}")]
    InvalidTransition {
        cell: String,
        from: CellStatus,
        action: LifecycleAction,
    },

    #[error("Cell {0} is in alarm, rework it before approval")]
    AlarmBlocking(String),

    #[error("No active cell")]
    NoActiveUnit,
}

/// Operator or engine action driving a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Select,
    Advance,
    Fail,
    Approve,
    Reject,
    Rework,
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleAction::Select => write!(f, "select"),
            LifecycleAction::Advance => write!(f, "advance"),
            LifecycleAction::Fail => write!(f, "fail"),
            LifecycleAction::Approve => write!(f, "approve"),
            LifecycleAction::Reject => write!(f, "reject"),
            LifecycleAction::Rework => write!(f, "rework"),
        }
    }
}

/// Outcome of a stage step on the active cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStep {
    /// Moved on to the given stage
    Next(ProcessStage),
    /// Final stage passed; the cell is now awaiting review
    Completed,
}

// ============================================================================
// Cell Grid
// ============================================================================

/// Fixed-size grid of cells, created once.
#[derive(Debug, Clone)]
pub struct CellGrid {
    cells: Vec<BlockLiftCell>,
    index: HashMap<String, usize>,
    /// Last selected cell
    focus: Option<usize>,
    /// Stage cursor of the active cell
    stage: Option<ProcessStage>,
}

impl CellGrid {
    /// Build a `blocks × lifts` grid, numbered from 1, all pending.
    pub fn new(blocks: u32, lifts: u32) -> Self {
        let cells: Vec<BlockLiftCell> = (1..=blocks)
            .flat_map(|b| (1..=lifts).map(move |l| BlockLiftCell::new(b, l)))
            .collect();
        let index = cells
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Self {
            cells,
            index,
            focus: None,
            stage: None,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[BlockLiftCell] {
        &self.cells
    }

    pub fn get(&self, id: &str) -> Option<&BlockLiftCell> {
        self.index.get(id).map(|&i| &self.cells[i])
    }

    fn position(&self, id: &str) -> Result<usize, LifecycleError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| LifecycleError::UnknownCell(id.to_string()))
    }

    /// Last selected cell, whatever its status
    pub fn focused(&self) -> Option<&BlockLiftCell> {
        self.focus.map(|i| &self.cells[i])
    }

    /// Cell currently holding the active slot
    pub fn active(&self) -> Option<&BlockLiftCell> {
        self.focused().filter(|c| c.status.is_active())
    }

    /// Stage the active cell is being checked against
    pub fn active_stage(&self) -> Option<ProcessStage> {
        self.active().and(self.stage)
    }

    /// First pending cell in grid order
    pub fn next_pending(&self) -> Option<&BlockLiftCell> {
        self.cells.iter().find(|c| c.status == CellStatus::Pending)
    }

    pub fn count(&self, status: CellStatus) -> usize {
        self.cells.iter().filter(|c| c.status == status).count()
    }

    pub fn set_ready_at(&mut self, id: &str, ready_at: Option<DateTime<Utc>>) {
        if let Some(&i) = self.index.get(id) {
            self.cells[i].ready_at = ready_at;
        }
    }

    fn transition(&mut self, i: usize, to: CellStatus, action: LifecycleAction) {
        let cell = &mut self.cells[i];
        let from = cell.status;
        cell.status = to;
        cell.approved = to == CellStatus::Approved;
        if !to.is_active() {
            cell.ready_at = None;
        }
        info!(cell = %cell.id, %from, %to, %action, "Cell transition");
    }

    fn active_index(&self) -> Result<usize, LifecycleError> {
        self.focus
            .filter(|&i| self.cells[i].status.is_active())
            .ok_or(LifecycleError::NoActiveUnit)
    }

    fn focused_index(&self) -> Result<usize, LifecycleError> {
        self.focus.ok_or(LifecycleError::NoActiveUnit)
    }

    fn invalid(&self, i: usize, action: LifecycleAction) -> LifecycleError {
        LifecycleError::InvalidTransition {
            cell: self.cells[i].id.clone(),
            from: self.cells[i].status,
            action,
        }
    }

    /// pending → in_progress. Re-selecting the active cell is a no-op and
    /// returns `false`.
    pub fn select(&mut self, id: &str) -> Result<bool, LifecycleError> {
        let target = self.position(id)?;

        if let Ok(active) = self.active_index() {
            if active == target {
                return Ok(false);
            }
            return Err(LifecycleError::UnitAlreadyActive {
                active: self.cells[active].id.clone(),
                requested: id.to_string(),
            });
        }

        if self.cells[target].status != CellStatus::Pending {
            return Err(self.invalid(target, LifecycleAction::Select));
        }

        self.transition(target, CellStatus::InProgress, LifecycleAction::Select);
        self.focus = Some(target);
        self.stage = Some(ProcessStage::Batching);
        Ok(true)
    }

    /// Advance the stage cursor of the in-progress cell. After the final
    /// stage the cell moves to awaiting.
    pub fn advance_stage(&mut self) -> Result<StageStep, LifecycleError> {
        let i = self.active_index()?;
        if self.cells[i].status != CellStatus::InProgress {
            return Err(self.invalid(i, LifecycleAction::Advance));
        }

        match self.stage.and_then(ProcessStage::next) {
            Some(next) => {
                self.stage = Some(next);
                Ok(StageStep::Next(next))
            }
            None => {
                self.transition(i, CellStatus::Awaiting, LifecycleAction::Advance);
                Ok(StageStep::Completed)
            }
        }
    }

    /// in_progress | awaiting → alarm. Returns `false` if already in alarm.
    pub fn fail(&mut self) -> Result<bool, LifecycleError> {
        let i = self.active_index()?;
        match self.cells[i].status {
            CellStatus::Alarm => Ok(false),
            CellStatus::InProgress | CellStatus::Awaiting => {
                self.transition(i, CellStatus::Alarm, LifecycleAction::Fail);
                Ok(true)
            }
            _ => Err(self.invalid(i, LifecycleAction::Fail)),
        }
    }

    /// awaiting → approved. Returns the approved cell id.
    pub fn approve(&mut self) -> Result<String, LifecycleError> {
        let i = self.active_index()?;
        match self.cells[i].status {
            CellStatus::Alarm => Err(LifecycleError::AlarmBlocking(self.cells[i].id.clone())),
            CellStatus::Awaiting => {
                self.transition(i, CellStatus::Approved, LifecycleAction::Approve);
                Ok(self.cells[i].id.clone())
            }
            _ => Err(self.invalid(i, LifecycleAction::Approve)),
        }
    }

    /// alarm → rejected. Returns the rejected cell id.
    pub fn reject(&mut self) -> Result<String, LifecycleError> {
        let i = self.active_index()?;
        if self.cells[i].status != CellStatus::Alarm {
            return Err(self.invalid(i, LifecycleAction::Reject));
        }
        self.transition(i, CellStatus::Rejected, LifecycleAction::Reject);
        Ok(self.cells[i].id.clone())
    }

    /// rejected → pending on `id`, or on the focused cell when `id` is
    /// `None`. A cell still in alarm is rejected first; only the active cell
    /// can be in alarm. Returns the reworked cell id and whether the
    /// rejection edge was taken here.
    pub fn rework(&mut self, id: Option<&str>) -> Result<(String, bool), LifecycleError> {
        let i = match id {
            Some(id) => self.position(id)?,
            None => self.focused_index()?,
        };
        let rejected_here = match self.cells[i].status {
            CellStatus::Alarm => {
                self.transition(i, CellStatus::Rejected, LifecycleAction::Reject);
                true
            }
            CellStatus::Rejected => false,
            _ => return Err(self.invalid(i, LifecycleAction::Rework)),
        };
        self.transition(i, CellStatus::Pending, LifecycleAction::Rework);
        Ok((self.cells[i].id.clone(), rejected_here))
    }
}

// ============================================================================
// Tests
// ============================================================================
