//! Impact Deriver
//!
//! Turns a failing rule result into one operator alarm plus zero or more
//! downstream impact events. The impact types come from a static
//! (stage, severity) table:
//!
//! | stage     | CRITICAL                 | HIGH          | MEDIUM        | LOW |
//! |-----------|--------------------------|---------------|---------------|-----|
//! | batching  | scm, financial           | scm           | scm           | –   |
//! | transport | schedule, collaboration  | schedule      | collaboration | –   |
//! | placement | schedule, financial      | schedule      | collaboration | –   |
//! | curing    | financial, collaboration | collaboration | collaboration | –   |

use chrono::{DateTime, Utc};

use crate::types::{
    AlarmAction, AlarmEvent, BlockLiftCell, ImpactEvent, ImpactType, ProcessStage, RuleResult,
    Severity, TraceChain,
};

/// Impact types raised by a failure at `stage` with `severity`.
pub fn impact_types(stage: ProcessStage, severity: Severity) -> &'static [ImpactType] {
    use ImpactType::*;
    use ProcessStage::*;
    use Severity::*;

    match (stage, severity) {
        (_, Low) => &[],
        (Batching, Critical) => &[Scm, Financial],
        (Batching, High | Medium) => &[Scm],
        (Transport, Critical) => &[Schedule, Collaboration],
        (Transport, High) => &[Schedule],
        (Transport, Medium) => &[Collaboration],
        (Placement, Critical) => &[Schedule, Financial],
        (Placement, High) => &[Schedule],
        (Placement, Medium) => &[Collaboration],
        (Curing, Critical) => &[Financial, Collaboration],
        (Curing, High | Medium) => &[Collaboration],
    }
}

/// Recovery recommendations attached to every impact of a type
pub fn recommendations(kind: ImpactType) -> Vec<String> {
    let items: &[&str] = match kind {
        ImpactType::Schedule => &[
            "Re-sequence the next lift placement",
            "Notify the site planner of the expected delay",
        ],
        ImpactType::Financial => &[
            "Log the nonconformance cost against the pour",
            "Review the remove-and-replace estimate",
        ],
        ImpactType::Scm => &[
            "Quarantine the remaining material lot",
            "Request a supplier corrective action",
        ],
        ImpactType::Collaboration => &[
            "Share the trace with the QA engineer",
            "Schedule a coordination review with the contractor",
        ],
    };
    items.iter().map(|s| s.to_string()).collect()
}

fn impact_title(kind: ImpactType) -> &'static str {
    match kind {
        ImpactType::Schedule => "Schedule risk",
        ImpactType::Financial => "Cost exposure",
        ImpactType::Scm => "Supply chain issue",
        ImpactType::Collaboration => "Coordination required",
    }
}

/// Sequential id generator for alarms and impacts
#[derive(Debug, Clone, Default)]
pub struct EventIds {
    alarms: u64,
    impacts: u64,
}

impl EventIds {
    pub fn next_alarm(&mut self) -> String {
        self.alarms += 1;
        format!("ALM-{:06}", self.alarms)
    }

    pub fn next_impact(&mut self) -> String {
        self.impacts += 1;
        format!("IMP-{:06}", self.impacts)
    }
}

/// Derived events for one failing result
#[derive(Debug, Clone)]
pub struct Derived {
    pub alarm: AlarmEvent,
    pub impacts: Vec<ImpactEvent>,
}

/// Derive the alarm and impacts for a failing `result` on `cell`.
///
/// The trace message is the lineage summary when a trace is available.
pub fn derive(
    result: &RuleResult,
    cell: &BlockLiftCell,
    trace: Option<&TraceChain>,
    ids: &mut EventIds,
    now: DateTime<Utc>,
) -> Derived {
    let rule = &result.rule;
    let block_label = cell.label();

    let trace_message = match trace {
        Some(t) => t.summary(),
        None => format!("No lineage recorded for {}", block_label),
    };

    let alarm = AlarmEvent {
        id: ids.next_alarm(),
        timestamp: now,
        severity: rule.severity,
        rule_id: rule.rule_id.clone(),
        description: format!(
            "{} · {} = {} ({})",
            rule.description, rule.metric, result.value, rule.allowed_range_label
        ),
        cell_id: cell.id.clone(),
        block_label: block_label.clone(),
        trace_message,
        actions: AlarmAction::standard_set(),
        stage_id: Some(rule.process_stage),
    };

    let impacts = impact_types(rule.process_stage, rule.severity)
        .iter()
        .map(|&kind| ImpactEvent {
            id: ids.next_impact(),
            kind,
            rule_id: rule.rule_id.clone(),
            severity: rule.severity,
            title: format!("{} · {}", impact_title(kind), rule.alarm_type),
            description: format!(
                "{} at {} ({} stage)",
                rule.description, block_label, rule.process_stage
            ),
            cell_id: cell.id.clone(),
            block_label: block_label.clone(),
            timestamp: now,
            recommendations: recommendations(kind),
        })
        .collect();

    Derived { alarm, impacts }
}
