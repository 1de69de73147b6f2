//! Evaluation outputs: RuleResult, AlarmEvent, ImpactEvent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProcessStage, RuleDescriptor, Severity};

// ============================================================================
// Rule Results
// ============================================================================

/// How the evaluated value was obtained
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// Present in the metrics map
    Reported,
    /// Computed from the derivation table
    Derived,
    /// Neither reported nor derivable; value defaulted to 0
    Defaulted,
}

/// Outcome of evaluating one rule. Regenerated every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub rule: RuleDescriptor,
    pub value: f64,
    pub passed: bool,
    pub message: String,
    pub source: ValueSource,
}

// ============================================================================
// Alarms
// ============================================================================

/// Operator action attached to an alarm. The serialized id is stable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlarmActionId {
    Rework,
    Trace,
    Highlight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmAction {
    pub action_id: AlarmActionId,
    pub label: String,
}

impl AlarmAction {
    /// The standard action set offered on every alarm
    pub fn standard_set() -> Vec<AlarmAction> {
        vec![
            AlarmAction { action_id: AlarmActionId::Rework, label: "Rework lift".to_string() },
            AlarmAction { action_id: AlarmActionId::Trace, label: "Trace lineage".to_string() },
            AlarmAction { action_id: AlarmActionId::Highlight, label: "Highlight cell".to_string() },
        ]
    }
}

/// Operator-facing notification for one failing rule on one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub rule_id: String,
    pub description: String,
    pub cell_id: String,
    pub block_label: String,
    pub trace_message: String,
    pub actions: Vec<AlarmAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<ProcessStage>,
}

// ============================================================================
// Impacts
// ============================================================================

/// Downstream consequence category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImpactType {
    Schedule,
    Financial,
    Scm,
    Collaboration,
}

impl std::fmt::Display for ImpactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImpactType::Schedule => write!(f, "schedule"),
            ImpactType::Financial => write!(f, "financial"),
            ImpactType::Scm => write!(f, "scm"),
            ImpactType::Collaboration => write!(f, "collaboration"),
        }
    }
}

/// Derived downstream event for one failing rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ImpactType,
    pub rule_id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub cell_id: String,
    pub block_label: String,
    pub timestamp: DateTime<Utc>,
    pub recommendations: Vec<String>,
}
