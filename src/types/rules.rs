//! Rule catalog types: RuleDescriptor, ConditionOperator, MetricKey, Severity, ProcessStage

use serde::{Deserialize, Serialize};

// ============================================================================
// Severity & Stage
// ============================================================================

/// Severity of a rule breach
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Production stage a rule belongs to, in pipeline order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStage {
    /// Material batching at the plant
    Batching,
    /// Conveyor / truck transport to the face
    Transport,
    /// Placement and compaction in the lift
    Placement,
    /// Curing of the placed lift
    Curing,
}

impl ProcessStage {
    /// All stages in the order a unit walks through them
    pub const ALL: [ProcessStage; 4] = [
        ProcessStage::Batching,
        ProcessStage::Transport,
        ProcessStage::Placement,
        ProcessStage::Curing,
    ];

    /// Stage following this one, `None` after curing
    pub fn next(self) -> Option<ProcessStage> {
        match self {
            ProcessStage::Batching => Some(ProcessStage::Transport),
            ProcessStage::Transport => Some(ProcessStage::Placement),
            ProcessStage::Placement => Some(ProcessStage::Curing),
            ProcessStage::Curing => None,
        }
    }

    /// Short code for logging
    pub fn short_code(self) -> &'static str {
        match self {
            ProcessStage::Batching => "BAT",
            ProcessStage::Transport => "TRN",
            ProcessStage::Placement => "PLC",
            ProcessStage::Curing => "CUR",
        }
    }
}

impl std::fmt::Display for ProcessStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStage::Batching => write!(f, "Batching"),
            ProcessStage::Transport => write!(f, "Transport"),
            ProcessStage::Placement => write!(f, "Placement"),
            ProcessStage::Curing => write!(f, "Curing"),
        }
    }
}

// ============================================================================
// Condition Operators
// ============================================================================

/// Comparison operator of a rule, as written in the catalog.
///
/// Catalog strings: `>=`, `<=`, `<`, `BETWEEN`, `MONTH_MAX`, `MONTH_CYCLE`.
/// Anything else is kept verbatim as `Unrecognized` and always passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    AtLeast,
    AtMost,
    Below,
    Between,
    MonthMax,
    MonthCycle,
    Unrecognized(String),
}

impl ConditionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            ConditionOperator::AtLeast => ">=",
            ConditionOperator::AtMost => "<=",
            ConditionOperator::Below => "<",
            ConditionOperator::Between => "BETWEEN",
            ConditionOperator::MonthMax => "MONTH_MAX",
            ConditionOperator::MonthCycle => "MONTH_CYCLE",
            ConditionOperator::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for ConditionOperator {
    fn from(raw: String) -> Self {
        match raw.trim() {
            ">=" => ConditionOperator::AtLeast,
            "<=" => ConditionOperator::AtMost,
            "<" => ConditionOperator::Below,
            "BETWEEN" => ConditionOperator::Between,
            "MONTH_MAX" => ConditionOperator::MonthMax,
            "MONTH_CYCLE" => ConditionOperator::MonthCycle,
            _ => ConditionOperator::Unrecognized(raw),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        op.as_str().to_string()
    }
}

impl std::fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved comparison with its parameters filled in from the descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    /// value >= low
    AtLeast(f64),
    /// value <= high
    AtMost(f64),
    /// value < high
    Below(f64),
    /// low <= value <= high
    Within { low: f64, high: f64 },
    /// value <= ceiling for the reference month
    MonthlyCeiling,
    /// value >= minimum for the reference month
    MonthlyMinimum,
    /// Always passes
    Permissive,
}

// ============================================================================
// Metric Keys
// ============================================================================

/// Metric a rule reads. Names match the flat metrics map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetricKey {
    MixingTimeSec,
    FineAggMoisturePct,
    BatchTempC,
    BatchTempDiffC,
    ConveyorSpeed,
    TransportSpeed,
    SlumpMm,
    PourTempC,
    WetDensityKgM3,
    AirContentPct,
    LiftDepthM,
    TimeBetweenLiftsHr,
    CuringDays,
    CompressiveStrength28dMpa,
    /// Not in the known table; resolved only if reported directly
    Other(String),
}

impl MetricKey {
    pub fn as_str(&self) -> &str {
        match self {
            MetricKey::MixingTimeSec => "mixing_time_sec",
            MetricKey::FineAggMoisturePct => "fine_agg_moisture_pct",
            MetricKey::BatchTempC => "batch_temp_c",
            MetricKey::BatchTempDiffC => "batch_temp_diff_c",
            MetricKey::ConveyorSpeed => "conveyor_speed",
            MetricKey::TransportSpeed => "transport_speed",
            MetricKey::SlumpMm => "slump_mm",
            MetricKey::PourTempC => "pour_temp_c",
            MetricKey::WetDensityKgM3 => "wet_density_kg_m3",
            MetricKey::AirContentPct => "air_content_pct",
            MetricKey::LiftDepthM => "lift_depth_m",
            MetricKey::TimeBetweenLiftsHr => "time_between_lifts_hr",
            MetricKey::CuringDays => "curing_days",
            MetricKey::CompressiveStrength28dMpa => "compressive_strength_28d_mpa",
            MetricKey::Other(name) => name,
        }
    }
}

impl From<String> for MetricKey {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "mixing_time_sec" => MetricKey::MixingTimeSec,
            "fine_agg_moisture_pct" => MetricKey::FineAggMoisturePct,
            "batch_temp_c" => MetricKey::BatchTempC,
            "batch_temp_diff_c" => MetricKey::BatchTempDiffC,
            "conveyor_speed" => MetricKey::ConveyorSpeed,
            "transport_speed" => MetricKey::TransportSpeed,
            "slump_mm" => MetricKey::SlumpMm,
            "pour_temp_c" => MetricKey::PourTempC,
            "wet_density_kg_m3" => MetricKey::WetDensityKgM3,
            "air_content_pct" => MetricKey::AirContentPct,
            "lift_depth_m" => MetricKey::LiftDepthM,
            "time_between_lifts_hr" => MetricKey::TimeBetweenLiftsHr,
            "curing_days" => MetricKey::CuringDays,
            "compressive_strength_28d_mpa" => MetricKey::CompressiveStrength28dMpa,
            _ => MetricKey::Other(raw),
        }
    }
}

impl From<MetricKey> for String {
    fn from(key: MetricKey) -> Self {
        key.as_str().to_string()
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Rule Descriptor
// ============================================================================

/// One declarative threshold rule from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDescriptor {
    pub rule_id: String,
    pub process_stage: ProcessStage,
    pub metric: MetricKey,
    pub condition_operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_high: Option<f64>,
    pub allowed_range_label: String,
    pub severity: Severity,
    pub alarm_type: String,
    pub description: String,
}

impl RuleDescriptor {
    /// Resolve the operator and thresholds into a comparison, applying the
    /// catalog defaults for absent thresholds.
    pub fn comparison(&self) -> Comparison {
        match self.condition_operator {
            ConditionOperator::AtLeast => Comparison::AtLeast(self.threshold_low.unwrap_or(0.0)),
            ConditionOperator::AtMost => {
                Comparison::AtMost(self.threshold_high.unwrap_or(f64::INFINITY))
            }
            ConditionOperator::Below => {
                Comparison::Below(self.threshold_high.unwrap_or(f64::INFINITY))
            }
            ConditionOperator::Between => Comparison::Within {
                low: self.threshold_low.unwrap_or(f64::NEG_INFINITY),
                high: self.threshold_high.unwrap_or(f64::INFINITY),
            },
            ConditionOperator::MonthMax => Comparison::MonthlyCeiling,
            ConditionOperator::MonthCycle => Comparison::MonthlyMinimum,
            ConditionOperator::Unrecognized(_) => Comparison::Permissive,
        }
    }

    /// Apply a shallow merge of the fields present in `patch`.
    pub fn apply(&mut self, patch: &RulePatch) {
        if let Some(stage) = patch.process_stage {
            self.process_stage = stage;
        }
        if let Some(ref metric) = patch.metric {
            self.metric = metric.clone();
        }
        if let Some(ref op) = patch.condition_operator {
            self.condition_operator = op.clone();
        }
        if let Some(low) = patch.threshold_low {
            self.threshold_low = low;
        }
        if let Some(high) = patch.threshold_high {
            self.threshold_high = high;
        }
        if let Some(ref label) = patch.allowed_range_label {
            self.allowed_range_label = label.clone();
        }
        if let Some(severity) = patch.severity {
            self.severity = severity;
        }
        if let Some(ref alarm_type) = patch.alarm_type {
            self.alarm_type = alarm_type.clone();
        }
        if let Some(ref description) = patch.description {
            self.description = description.clone();
        }
    }
}

/// Partial update for a rule. Absent fields are left untouched.
///
/// Thresholds distinguish absent from `null`: `Some(None)` clears the
/// threshold, so a two-sided rule can be made one-sided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RulePatch {
    pub process_stage: Option<ProcessStage>,
    pub metric: Option<MetricKey>,
    pub condition_operator: Option<ConditionOperator>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub threshold_low: Option<Option<f64>>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub threshold_high: Option<Option<f64>>,
    pub allowed_range_label: Option<String>,
    pub severity: Option<Severity>,
    pub alarm_type: Option<String>,
    pub description: Option<String>,
}

/// Only called for fields present in the input, so `null` becomes `Some(None)`.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}

// ============================================================================
// Tests
// ============================================================================
