//! Monitoring Engine
//!
//! The engine core is a plain struct that owns all mutable state: the cell
//! grid, the lineage resolver, active alarms and impacts. It is driven by
//! [`EngineActor`], which serializes every operator command through a
//! mailbox and owns the auto-advance timer.
//!
//! ```text
//! metrics ──▶ Evaluator (catalog rules for the active stage)
//!                │
//!                ├─ all pass ──▶ CellGrid::advance_stage ──▶ awaiting
//!                └─ failures ──▶ CellGrid::fail ──▶ impact::derive ──▶ alarms / impacts
//! ```

pub mod actor;
mod clock;
mod commands;
mod error;
mod scheduler;

pub use actor::{EngineActor, EngineHandle};
pub use clock::{Clock, FixedClock, SystemClock};
pub use commands::OperatorCommand;
pub use error::EngineError;
pub use scheduler::{AutoAdvanceTimer, Tick};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::catalog::RuleCatalog;
use crate::config::{defaults, PlantConfig};
use crate::evaluator::Evaluator;
use crate::impact::{self, EventIds};
use crate::lifecycle::{CellGrid, LifecycleError, StageStep};
use crate::lineage::readings::ReadingSource;
use crate::lineage::{LineageResolver, ReferenceTables};
use crate::types::{
    AlarmEvent, Banner, Batch, BatchStatus, CellStatus, EngineSnapshot, FlowState, ImpactEvent,
    ImpactType, MetricsInput, MetricsSnapshot, Pour, RuleDescriptor, RulePatch, RuleResult,
    TraceChain,
};

// ============================================================================
// Settings
// ============================================================================

/// Engine parameters, usually taken from [`PlantConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub blocks: u32,
    pub lifts: u32,
    pub batch_pool_size: usize,
    /// Delay between auto-advance steps
    pub dwell: std::time::Duration,
    pub auto_advance: bool,
    pub strict_missing_metrics: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            blocks: defaults::BLOCKS,
            lifts: defaults::LIFTS,
            batch_pool_size: defaults::BATCH_POOL_SIZE,
            dwell: std::time::Duration::from_secs_f64(defaults::DWELL_SECS),
            auto_advance: false,
            strict_missing_metrics: false,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &PlantConfig) -> Self {
        Self {
            blocks: config.plant.blocks,
            lifts: config.plant.lifts,
            batch_pool_size: config.lineage.batch_pool_size,
            dwell: std::time::Duration::try_from_secs_f64(config.lifecycle.dwell_secs)
                .unwrap_or_else(|_| Self::default().dwell),
            auto_advance: config.lifecycle.auto_advance,
            strict_missing_metrics: config.evaluation.strict_missing_metrics,
        }
    }
}

/// Next scheduled auto-advance step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wakeup {
    pub cell_id: String,
    pub due: DateTime<Utc>,
    /// Time left until `due` by the engine clock
    pub delay: std::time::Duration,
}

/// Pour and batch assigned to the active cell
#[derive(Debug, Clone)]
struct Assignment {
    cell_id: String,
    pour: Pour,
    batch: Batch,
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    settings: EngineSettings,
    catalog: Arc<RuleCatalog>,
    evaluator: Evaluator,
    grid: CellGrid,
    lineage: LineageResolver,
    clock: Arc<dyn Clock>,
    dwell: chrono::Duration,
    ids: EventIds,
    alarms: Vec<AlarmEvent>,
    impacts: BTreeMap<ImpactType, Vec<ImpactEvent>>,
    assignment: Option<Assignment>,
    trace: Option<TraceChain>,
    last_results: Vec<RuleResult>,
    auto_advance: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cells", &self.grid.len())
            .field("active", &self.grid.active().map(|c| c.id.as_str()))
            .field("alarms", &self.alarms.len())
            .field("auto_advance", &self.auto_advance)
            .finish()
    }
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        catalog: Arc<RuleCatalog>,
        tables: ReferenceTables,
        readings: Box<dyn ReadingSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let grid = CellGrid::new(settings.blocks, settings.lifts);
        let lineage = LineageResolver::new(tables, settings.batch_pool_size.max(1), readings, now);
        let dwell = chrono::Duration::from_std(settings.dwell).unwrap_or_else(|_| chrono::Duration::zero());

        info!(
            cells = grid.len(),
            blocks = settings.blocks,
            lifts = settings.lifts,
            auto_advance = settings.auto_advance,
            "Engine created"
        );

        Self {
            evaluator: Evaluator::new(settings.strict_missing_metrics),
            auto_advance: settings.auto_advance,
            settings,
            catalog,
            grid,
            lineage,
            clock,
            dwell,
            ids: EventIds::default(),
            alarms: Vec::new(),
            impacts: BTreeMap::new(),
            assignment: None,
            trace: None,
            last_results: Vec::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &Arc<RuleCatalog> {
        &self.catalog
    }

    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    pub fn lineage(&self) -> &LineageResolver {
        &self.lineage
    }

    pub fn alarms(&self) -> &[AlarmEvent] {
        &self.alarms
    }

    pub fn auto_advance(&self) -> bool {
        self.auto_advance
    }

    /// Dispatch one operator command.
    pub fn apply(&mut self, command: OperatorCommand) -> Result<EngineSnapshot, EngineError> {
        debug!(command = command.name(), "Applying command");
        match command {
            OperatorCommand::SelectUnit { cell_id } => self.select_unit(&cell_id),
            OperatorCommand::Approve => self.approve(),
            OperatorCommand::Reject => self.reject(),
            OperatorCommand::Rework { cell_id } => self.rework(cell_id.as_deref()),
            OperatorCommand::DismissAlarm { id } => self.dismiss_alarm(&id),
            OperatorCommand::AcknowledgeImpact { kind, id } => self.acknowledge_impact(kind, &id),
            OperatorCommand::PatchRule { rule_id, patch } => self.patch_rule(&rule_id, &patch),
            OperatorCommand::ToggleAutoAdvance { enabled } => Ok(self.toggle_auto_advance(enabled)),
            OperatorCommand::Evaluate { metrics } => self.evaluate(&metrics),
            OperatorCommand::Snapshot => Ok(self.snapshot()),
        }
    }

    // ========================================================================
    // Lifecycle commands
    // ========================================================================

    /// Make a pending cell the active unit and assign it a batch.
    pub fn select_unit(&mut self, cell_id: &str) -> Result<EngineSnapshot, EngineError> {
        let now = self.clock.now();
        if !self.grid.select(cell_id)? {
            return Ok(self.snapshot());
        }

        let cell = self
            .grid
            .get(cell_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownCell(cell_id.to_string()))?;
        let (pour, batch) = self.lineage.assign(&cell, now)?;
        let label = cell.label();

        let trace = match self.lineage.build_trace(&pour, &batch, &label) {
            Ok(trace) => trace,
            Err(e) => {
                warn!(cell = %cell.id, batch = %batch.id, error = %e, "Lineage unresolved, using placeholder trace");
                TraceChain::unresolved(&pour, &batch, &label)
            }
        };

        info!(cell = %cell.id, pour = %pour.id, batch = %batch.id, "Unit selected");
        self.trace = Some(trace);
        self.assignment = Some(Assignment {
            cell_id: cell.id,
            pour,
            batch,
        });
        self.last_results.clear();
        self.reschedule(now);
        Ok(self.snapshot())
    }

    /// Evaluate the active cell against the rules of its current stage
    /// (every rule once the cell is awaiting review).
    pub fn evaluate(&mut self, overrides: &MetricsInput) -> Result<EngineSnapshot, EngineError> {
        let cell = self.grid.active().cloned().ok_or(EngineError::NoActiveUnit)?;
        let rules = self.catalog.rules()?;
        let now = self.clock.now();

        let metrics = match &self.assignment {
            Some(a) if a.cell_id == cell.id => {
                MetricsSnapshot::from_context(&a.pour, &a.batch, overrides, now)
            }
            _ => MetricsSnapshot::new(overrides.clone(), now),
        };

        let stage = self.grid.active_stage();
        let selected: Vec<&RuleDescriptor> = match cell.status {
            CellStatus::Awaiting => rules.iter().collect(),
            _ => rules.iter().filter(|r| Some(r.process_stage) == stage).collect(),
        };
        let results = self.evaluator.evaluate_all(selected, &metrics);
        let failures: Vec<&RuleResult> = results.iter().filter(|r| !r.passed).collect();

        if cell.status == CellStatus::Alarm {
            debug!(cell = %cell.id, failures = failures.len(), "Cell already in alarm, results refreshed");
        } else if failures.is_empty() {
            if cell.status == CellStatus::InProgress {
                match self.grid.advance_stage()? {
                    StageStep::Next(next) => {
                        info!(cell = %cell.id, stage = %next, "Stage passed");
                    }
                    StageStep::Completed => {
                        info!(cell = %cell.id, "All stages passed, awaiting review");
                    }
                }
            }
        } else {
            self.grid.fail()?;
            for result in &failures {
                let derived = impact::derive(result, &cell, self.trace.as_ref(), &mut self.ids, now);
                self.alarms.push(derived.alarm);
                for event in derived.impacts {
                    self.impacts.entry(event.kind).or_default().push(event);
                }
            }
            let worst = failures.iter().map(|r| r.rule.severity).max();
            warn!(
                cell = %cell.id,
                failures = failures.len(),
                severity = ?worst,
                "Unit entered alarm"
            );
        }

        self.last_results = results;
        self.reschedule(now);
        Ok(self.snapshot())
    }

    /// awaiting → approved
    pub fn approve(&mut self) -> Result<EngineSnapshot, EngineError> {
        let cell_id = match self.grid.approve() {
            Ok(id) => id,
            Err(LifecycleError::AlarmBlocking(cell)) => {
                let alarms = self.alarms.iter().filter(|a| a.cell_id == cell).count();
                warn!(cell = %cell, alarms, "Approval blocked by active alarm");
                return Err(EngineError::AlarmBlocking { cell, alarms });
            }
            Err(e) => return Err(e.into()),
        };
        self.finish_cycle(&cell_id, BatchStatus::Accepted);
        Ok(self.snapshot())
    }

    /// alarm → rejected
    pub fn reject(&mut self) -> Result<EngineSnapshot, EngineError> {
        let cell_id = self.grid.reject()?;
        self.finish_cycle(&cell_id, BatchStatus::Failed);
        Ok(self.snapshot())
    }

    /// rejected → pending, clearing the alarms raised for that cell. Without
    /// a cell id the focused cell is reworked.
    pub fn rework(&mut self, cell_id: Option<&str>) -> Result<EngineSnapshot, EngineError> {
        let (cell_id, rejected_here) = self.grid.rework(cell_id)?;
        if rejected_here {
            self.finish_cycle(&cell_id, BatchStatus::Failed);
        }

        let before = self.alarms.len();
        self.alarms.retain(|a| a.cell_id != cell_id);
        info!(cell = %cell_id, cleared_alarms = before - self.alarms.len(), "Unit returned for rework");
        Ok(self.snapshot())
    }

    /// Record the batch outcome after a terminal state. The pool recycles
    /// on the next assignment, so the outcome stays visible until then.
    fn finish_cycle(&mut self, cell_id: &str, status: BatchStatus) {
        if let Some(assignment) = self.assignment.take() {
            if assignment.cell_id == cell_id {
                self.lineage.record_outcome(&assignment.batch.id, status);
                if let Some(trace) = self.trace.as_mut() {
                    if trace.batch.id == assignment.batch.id {
                        trace.batch.status = status;
                    }
                }
                info!(cell = %cell_id, batch = %assignment.batch.id, %status, "Batch outcome recorded");
            } else {
                self.assignment = Some(assignment);
            }
        }
    }

    // ========================================================================
    // Alarm / impact / catalog commands
    // ========================================================================

    /// Remove an alarm from the active set. Cell status is untouched.
    pub fn dismiss_alarm(&mut self, id: &str) -> Result<EngineSnapshot, EngineError> {
        let index = self
            .alarms
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| EngineError::AlarmNotFound(id.to_string()))?;
        let alarm = self.alarms.remove(index);
        info!(alarm = %alarm.id, rule_id = %alarm.rule_id, cell = %alarm.cell_id, "Alarm dismissed");
        Ok(self.snapshot())
    }

    /// Remove an impact from the active set. Cell status is untouched.
    pub fn acknowledge_impact(
        &mut self,
        kind: ImpactType,
        id: &str,
    ) -> Result<EngineSnapshot, EngineError> {
        let not_found = || EngineError::ImpactNotFound {
            kind,
            id: id.to_string(),
        };
        let list = self.impacts.get_mut(&kind).ok_or_else(not_found)?;
        let index = list.iter().position(|i| i.id == id).ok_or_else(not_found)?;
        list.remove(index);
        if list.is_empty() {
            self.impacts.remove(&kind);
        }
        info!(impact = %id, %kind, "Impact acknowledged");
        Ok(self.snapshot())
    }

    /// Patch one catalog rule. Unknown rule ids are ignored by the catalog.
    pub fn patch_rule(&mut self, rule_id: &str, patch: &RulePatch) -> Result<EngineSnapshot, EngineError> {
        self.catalog.patch(rule_id, patch)?;
        Ok(self.snapshot())
    }

    pub fn toggle_auto_advance(&mut self, enabled: bool) -> EngineSnapshot {
        if self.auto_advance != enabled {
            info!(enabled, "Auto-advance toggled");
        }
        self.auto_advance = enabled;
        let now = self.clock.now();
        self.reschedule(now);
        self.snapshot()
    }

    // ========================================================================
    // Auto-advance
    // ========================================================================

    /// Set or clear the focused cell's `ready_at` for the next automatic step.
    fn reschedule(&mut self, now: DateTime<Utc>) {
        let Some(cell) = self.grid.focused() else {
            return;
        };
        let eligible =
            self.auto_advance && matches!(cell.status, CellStatus::InProgress | CellStatus::Awaiting);
        let ready_at = eligible.then(|| now + self.dwell);
        let id = cell.id.clone();
        self.grid.set_ready_at(&id, ready_at);
    }

    /// The next automatic step, if one is due for the active cell.
    pub fn pending_wakeup(&self) -> Option<Wakeup> {
        if !self.auto_advance {
            return None;
        }
        let cell = self.grid.active()?;
        let due = cell.ready_at?;
        let delay = (due - self.clock.now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        Some(Wakeup {
            cell_id: cell.id.clone(),
            due,
            delay,
        })
    }

    /// Run one automatic step for `cell_id`: evaluate the next stage while
    /// in progress, approve and move to the next pending cell once awaiting.
    ///
    /// Returns `None` when the wake-up no longer applies.
    pub fn auto_advance_tick(&mut self, cell_id: &str) -> Result<Option<EngineSnapshot>, EngineError> {
        if !self.auto_advance {
            debug!(cell = %cell_id, "Auto-advance paused, tick ignored");
            return Ok(None);
        }
        let Some(cell) = self.grid.active().cloned() else {
            debug!(cell = %cell_id, "No active cell, tick ignored");
            return Ok(None);
        };
        if cell.id != cell_id {
            debug!(cell = %cell_id, active = %cell.id, "Tick for inactive cell ignored");
            return Ok(None);
        }

        match cell.status {
            CellStatus::InProgress => {
                self.evaluate(&MetricsInput::new())?;
            }
            CellStatus::Awaiting => {
                self.approve()?;
                match self.grid.next_pending().map(|c| c.id.clone()) {
                    Some(next) => {
                        self.select_unit(&next)?;
                    }
                    None => info!("No pending cells left"),
                }
            }
            _ => return Ok(None),
        }
        Ok(Some(self.snapshot()))
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    fn banner(&self) -> Banner {
        let focused = self.grid.focused();
        let state = FlowState::for_status(focused.map(|c| c.status));
        let Some(cell) = focused else {
            return Banner {
                state,
                message: "Select a cell to begin".to_string(),
                ..Banner::default()
            };
        };
        let label = cell.label();

        if state == FlowState::Alert {
            // Highest severity wins, earliest alarm on ties
            let headline = self
                .alarms
                .iter()
                .filter(|a| a.cell_id == cell.id)
                .max_by(|a, b| a.severity.cmp(&b.severity).then_with(|| b.id.cmp(&a.id)));
            return match headline {
                Some(alarm) => Banner {
                    state,
                    headline_rule_id: Some(alarm.rule_id.clone()),
                    severity: Some(alarm.severity),
                    message: format!("{} · {}", alarm.rule_id, alarm.description),
                },
                None => Banner {
                    state,
                    message: format!("{label} in alarm"),
                    ..Banner::default()
                },
            };
        }

        let message = match cell.status {
            CellStatus::Pending => format!("{label} pending"),
            CellStatus::InProgress => match self.grid.active_stage() {
                Some(stage) => format!("{label} · {stage} checks"),
                None => format!("{label} in progress"),
            },
            CellStatus::Awaiting => format!("{label} awaiting review"),
            CellStatus::Approved => format!("{label} approved"),
            CellStatus::Rejected => format!("{label} rejected"),
            CellStatus::Alarm => format!("{label} in alarm"),
        };
        Banner {
            state,
            message,
            ..Banner::default()
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            generated_at: self.clock.now(),
            banner: self.banner(),
            auto_advance: self.auto_advance,
            active_cell_id: self.grid.active().map(|c| c.id.clone()),
            active_stage: self.grid.active_stage(),
            cells: self.grid.cells().to_vec(),
            alarms: self.alarms.clone(),
            impacts: self.impacts.clone(),
            trace: self.trace.clone(),
            last_results: self.last_results.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{parse_catalog, BUILTIN_RULES_JSON};
    use crate::lineage::readings::FixedReadings;
    use crate::types::{ProcessStage, Severity};
    use chrono::TimeZone;

    fn july() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 15, 8, 0, 0).single().expect("valid date")
    }

    fn loaded_catalog() -> Arc<RuleCatalog> {
        let rules = parse_catalog(BUILTIN_RULES_JSON, "builtin").expect("builtin parses");
        Arc::new(RuleCatalog::from_rules(rules).expect("builtin valid"))
    }

    fn engine_with(readings: FixedReadings, settings: EngineSettings) -> Engine {
        let now = july();
        Engine::new(
            settings,
            loaded_catalog(),
            ReferenceTables::builtin(now),
            Box::new(readings),
            Arc::new(FixedClock::new(now)),
        )
    }

    fn engine() -> Engine {
        engine_with(
            FixedReadings::nominal(),
            EngineSettings { blocks: 2, lifts: 2, batch_pool_size: 3, ..EngineSettings::default() },
        )
    }

    fn metrics(pairs: &[(&str, f64)]) -> MetricsInput {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    /// Select B01-L01 and pass batching and transport
    fn at_placement(e: &mut Engine) {
        e.select_unit("B01-L01").expect("select");
        e.evaluate(&MetricsInput::new()).expect("batching");
        let snap = e.evaluate(&MetricsInput::new()).expect("transport");
        assert_eq!(snap.active_stage, Some(ProcessStage::Placement));
    }

    #[test]
    fn test_select_assigns_lineage() {
        let mut e = engine();
        let snap = e.select_unit("B01-L01").expect("select");
        assert_eq!(snap.active_cell_id.as_deref(), Some("B01-L01"));
        assert_eq!(snap.active_stage, Some(ProcessStage::Batching));
        assert_eq!(snap.banner.state, FlowState::Monitoring);
        let trace = snap.trace.expect("trace");
        assert!(trace.resolved);
        assert_eq!(trace.block_label, "Block 1 · Lift 1");
        assert_eq!(trace.batch.id, "BT-0001");
    }

    #[test]
    fn test_nominal_walk_reaches_awaiting_and_approves() {
        let mut e = engine();
        e.select_unit("B01-L01").expect("select");
        for _ in 0..4 {
            let snap = e.evaluate(&MetricsInput::new()).expect("evaluate");
            assert!(snap.last_results.iter().all(|r| r.passed), "{:?}", snap.last_results);
        }
        assert_eq!(e.grid().get("B01-L01").map(|c| c.status), Some(CellStatus::Awaiting));

        let snap = e.approve().expect("approve");
        let cell = snap.cell("B01-L01").expect("cell");
        assert_eq!(cell.status, CellStatus::Approved);
        assert!(cell.approved);
        assert_eq!(snap.banner.state, FlowState::Accepted);
        assert_eq!(snap.trace.map(|t| t.batch.status), Some(BatchStatus::Accepted));
        assert!(snap.active_cell_id.is_none());
    }

    #[test]
    fn test_multiple_failures_enter_alarm_once() {
        let mut e = engine();
        at_placement(&mut e);
        let snap = e
            .evaluate(&metrics(&[("pour_temp_c", 17.0), ("lift_depth_m", 3.4)]))
            .expect("evaluate");

        assert_eq!(snap.cell("B01-L01").map(|c| c.status), Some(CellStatus::Alarm));
        assert_eq!(snap.alarms.len(), 2);
        assert_eq!(snap.banner.state, FlowState::Alert);
        assert_eq!(snap.banner.headline_rule_id.as_deref(), Some("PLC-001"));
        assert_eq!(snap.banner.severity, Some(Severity::Critical));
        // CRITICAL placement → schedule + financial, HIGH placement → schedule
        assert_eq!(snap.impacts.get(&ImpactType::Schedule).map(Vec::len), Some(2));
        assert_eq!(snap.impacts.get(&ImpactType::Financial).map(Vec::len), Some(1));

        // Still failing: no new alarms
        let snap = e.evaluate(&metrics(&[("pour_temp_c", 17.0)])).expect("evaluate");
        assert_eq!(snap.alarms.len(), 2);
    }

    #[test]
    fn test_approve_in_alarm_is_blocked() {
        let mut e = engine();
        at_placement(&mut e);
        e.evaluate(&metrics(&[("pour_temp_c", 17.0)])).expect("evaluate");
        match e.approve() {
            Err(EngineError::AlarmBlocking { cell, alarms }) => {
                assert_eq!(cell, "B01-L01");
                assert_eq!(alarms, 1);
            }
            other => panic!("expected AlarmBlocking, got {other:?}"),
        }
    }

    #[test]
    fn test_dismiss_alarm_keeps_status() {
        let mut e = engine();
        at_placement(&mut e);
        let snap = e.evaluate(&metrics(&[("pour_temp_c", 17.0)])).expect("evaluate");
        let alarm_id = snap.alarms[0].id.clone();
        let snap = e.dismiss_alarm(&alarm_id).expect("dismiss");
        assert!(snap.alarms.is_empty());
        assert_eq!(snap.cell("B01-L01").map(|c| c.status), Some(CellStatus::Alarm));
        assert!(matches!(e.dismiss_alarm(&alarm_id), Err(EngineError::AlarmNotFound(_))));
    }

    #[test]
    fn test_acknowledge_impact_keeps_status() {
        let mut e = engine();
        at_placement(&mut e);
        let snap = e.evaluate(&metrics(&[("lift_depth_m", 3.4)])).expect("evaluate");
        let impact = snap.impacts[&ImpactType::Schedule][0].clone();
        let snap = e.acknowledge_impact(ImpactType::Schedule, &impact.id).expect("ack");
        assert_eq!(snap.impact_count(), 0);
        assert!(!snap.impacts.contains_key(&ImpactType::Schedule));
        assert_eq!(snap.cell("B01-L01").map(|c| c.status), Some(CellStatus::Alarm));
        assert!(matches!(
            e.acknowledge_impact(ImpactType::Schedule, &impact.id),
            Err(EngineError::ImpactNotFound { .. })
        ));
    }

    #[test]
    fn test_rework_clears_only_that_units_alarms() {
        let mut e = engine();
        at_placement(&mut e);
        e.evaluate(&metrics(&[("pour_temp_c", 17.0)])).expect("evaluate");
        e.reject().expect("reject");

        // Second unit alarms too
        e.select_unit("B01-L02").expect("select");
        let snap = e.evaluate(&metrics(&[("mixing_time_sec", 60.0)])).expect("evaluate");
        assert_eq!(snap.alarms.len(), 2);
        e.reject().expect("reject");

        // Focus is on B01-L02; rework it
        let snap = e.rework(None).expect("rework");
        assert_eq!(snap.cell("B01-L02").map(|c| c.status), Some(CellStatus::Pending));
        assert_eq!(snap.alarms.len(), 1);
        assert_eq!(snap.alarms[0].cell_id, "B01-L01");
    }

    #[test]
    fn test_rework_from_alarm_passes_through_rejected() {
        let mut e = engine();
        at_placement(&mut e);
        e.evaluate(&metrics(&[("pour_temp_c", 17.0)])).expect("evaluate");
        let snap = e.rework(None).expect("rework");
        assert_eq!(snap.cell("B01-L01").map(|c| c.status), Some(CellStatus::Pending));
        assert_eq!(snap.trace.map(|t| t.batch.status), Some(BatchStatus::Failed));
        assert!(snap.alarms.is_empty());
        // Cell can go around again
        e.select_unit("B01-L01").expect("reselect");
    }

    #[test]
    fn test_rework_named_cell_after_moving_on() {
        let mut e = engine();
        e.select_unit("B01-L01").expect("select");
        e.evaluate(&metrics(&[("mixing_time_sec", 60.0)])).expect("evaluate");
        e.reject().expect("reject");
        e.select_unit("B01-L02").expect("select next");

        assert!(matches!(e.rework(None), Err(EngineError::InvalidTransition { .. })));
        let snap = e.rework(Some("B01-L01")).expect("rework named cell");
        assert_eq!(snap.cell("B01-L01").map(|c| c.status), Some(CellStatus::Pending));
        assert!(snap.alarms.is_empty());
        assert_eq!(snap.active_cell_id.as_deref(), Some("B01-L02"));
        assert_eq!(snap.trace.map(|t| t.batch.id), Some("BT-0002".to_string()));
    }

    #[test]
    fn test_batch_outcomes_stay_in_pool_until_recycled() {
        let status = |e: &Engine, id: &str| e.lineage().batch(id).map(|b| b.status);
        let walk = |e: &mut Engine, cell: &str| {
            e.select_unit(cell).expect("select");
            for _ in 0..4 {
                e.evaluate(&MetricsInput::new()).expect("evaluate");
            }
        };

        let mut e = engine();
        walk(&mut e, "B01-L01");
        e.approve().expect("approve");
        assert_eq!(status(&e, "BT-0001"), Some(BatchStatus::Accepted));

        e.select_unit("B01-L02").expect("select");
        assert_eq!(status(&e, "BT-0001"), Some(BatchStatus::Pending));
        e.evaluate(&metrics(&[("mixing_time_sec", 60.0)])).expect("evaluate");
        e.reject().expect("reject");
        assert_eq!(status(&e, "BT-0002"), Some(BatchStatus::Failed));

        walk(&mut e, "B02-L01");
        e.approve().expect("approve");
        assert_eq!(status(&e, "BT-0002"), Some(BatchStatus::Pending));
        assert_eq!(status(&e, "BT-0003"), Some(BatchStatus::Accepted));

        // Third recycle completes a full rotation of the three-batch pool
        let snap = e.select_unit("B02-L02").expect("select");
        assert_eq!(snap.trace.map(|t| t.batch.id), Some("BT-0001".to_string()));
        let pool: Vec<(&str, BatchStatus)> =
            e.lineage().pool().map(|b| (b.id.as_str(), b.status)).collect();
        assert_eq!(
            pool,
            vec![
                ("BT-0001", BatchStatus::Pending),
                ("BT-0002", BatchStatus::Pending),
                ("BT-0003", BatchStatus::Pending),
            ]
        );
    }

    #[test]
    fn test_second_activation_rejected() {
        let mut e = engine();
        e.select_unit("B01-L01").expect("select");
        assert!(matches!(
            e.select_unit("B02-L01"),
            Err(EngineError::UnitAlreadyActive { .. })
        ));
        assert!(matches!(e.select_unit("B09-L01"), Err(EngineError::UnknownCell(_))));
    }

    #[test]
    fn test_evaluate_requires_loaded_catalog() {
        let now = july();
        let mut e = Engine::new(
            EngineSettings::default(),
            Arc::new(RuleCatalog::builtin()),
            ReferenceTables::builtin(now),
            Box::new(FixedReadings::nominal()),
            Arc::new(FixedClock::new(now)),
        );
        e.select_unit("B01-L01").expect("select");
        assert!(matches!(e.evaluate(&MetricsInput::new()), Err(EngineError::NotInitialized)));
    }

    #[test]
    fn test_evaluate_without_active_unit() {
        let mut e = engine();
        assert!(matches!(e.evaluate(&MetricsInput::new()), Err(EngineError::NoActiveUnit)));
    }

    #[test]
    fn test_empty_reference_tables_degrade_to_unresolved_trace() {
        let now = july();
        let mut e = Engine::new(
            EngineSettings::default(),
            loaded_catalog(),
            ReferenceTables::default(),
            Box::new(FixedReadings::nominal()),
            Arc::new(FixedClock::new(now)),
        );
        let snap = e.select_unit("B01-L01").expect("select still succeeds");
        let trace = snap.trace.expect("placeholder trace");
        assert!(!trace.resolved);
        assert_eq!(trace.vendor.name, "Unresolved vendor");
    }

    #[test]
    fn test_patch_rule_command() {
        let mut e = engine();
        at_placement(&mut e);
        let cmd: OperatorCommand = serde_json::from_str(
            r#"{"command":"patchRule","ruleId":"PLC-001","patch":{"severity":"LOW"}}"#,
        )
        .expect("parse");
        e.apply(cmd).expect("patch");
        let snap = e.evaluate(&metrics(&[("pour_temp_c", 17.0)])).expect("evaluate");
        assert_eq!(snap.alarms[0].severity, Severity::Low);
        assert_eq!(snap.impact_count(), 0, "LOW severity derives no impacts");
    }

    #[test]
    fn test_auto_advance_walks_and_moves_on() {
        let mut e = engine_with(
            FixedReadings::nominal(),
            EngineSettings {
                blocks: 1,
                lifts: 2,
                batch_pool_size: 2,
                auto_advance: true,
                ..EngineSettings::default()
            },
        );
        e.select_unit("B01-L01").expect("select");
        let wake = e.pending_wakeup().expect("scheduled");
        assert_eq!(wake.cell_id, "B01-L01");
        assert_eq!(wake.delay, std::time::Duration::from_secs(5));

        // Four stages, then approval
        for _ in 0..5 {
            assert!(e.auto_advance_tick("B01-L01").expect("tick").is_some());
        }
        assert_eq!(e.grid().get("B01-L01").map(|c| c.status), Some(CellStatus::Approved));
        assert_eq!(e.grid().active().map(|c| c.id.as_str()), Some("B01-L02"));
        assert_eq!(e.pending_wakeup().map(|w| w.cell_id), Some("B01-L02".to_string()));
    }

    #[test]
    fn test_stale_tick_ignored() {
        let mut e = engine();
        e.toggle_auto_advance(true);
        e.select_unit("B01-L01").expect("select");
        assert!(e.auto_advance_tick("B02-L02").expect("tick").is_none());
        e.toggle_auto_advance(false);
        assert!(e.pending_wakeup().is_none());
        assert!(e.auto_advance_tick("B01-L01").expect("tick").is_none());
    }

    #[test]
    fn test_alarm_cancels_auto_advance() {
        let mut e = engine_with(
            FixedReadings::nominal().with_mix(|m| m.mixing_time_sec = 60.0),
            EngineSettings { auto_advance: true, ..EngineSettings::default() },
        );
        e.select_unit("B01-L01").expect("select");
        let snap = e.auto_advance_tick("B01-L01").expect("tick").expect("applied");
        assert_eq!(snap.cell("B01-L01").map(|c| c.status), Some(CellStatus::Alarm));
        assert!(e.pending_wakeup().is_none());
    }
}
