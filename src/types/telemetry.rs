//! Telemetry types: MetricsSnapshot and the flat metrics map

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Batch, Pour};

/// Flat metric name → value mapping supplied with an evaluation call.
pub type MetricsInput = HashMap<String, f64>;

/// Everything a rule evaluation may look at: reported metrics, the reference
/// clock used for month-dependent thresholds, and the active batch/pour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub metrics: MetricsInput,
    pub reference_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<Batch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pour: Option<Pour>,
}

impl MetricsSnapshot {
    /// Snapshot with only reported metrics and no production context.
    pub fn new(metrics: MetricsInput, reference_time: DateTime<Utc>) -> Self {
        Self {
            metrics,
            reference_time,
            batch: None,
            pour: None,
        }
    }

    /// Snapshot seeded from a pour's readings and its batch mix, with
    /// `overrides` layered on top. Derived metrics are left for the evaluator.
    pub fn from_context(
        pour: &Pour,
        batch: &Batch,
        overrides: &MetricsInput,
        reference_time: DateTime<Utc>,
    ) -> Self {
        let r = &pour.readings;
        let mut metrics: MetricsInput = [
            ("pour_temp_c", r.pour_temp_c),
            ("slump_mm", r.slump_mm),
            ("wet_density_kg_m3", r.wet_density_kg_m3),
            ("air_content_pct", r.air_content_pct),
            ("conveyor_speed", r.conveyor_speed),
            ("transport_speed", r.transport_speed),
            ("lift_depth_m", r.lift_depth_m),
            ("time_between_lifts_hr", r.time_between_lifts_hr),
            ("curing_days", r.curing_days),
            ("mixing_time_sec", batch.mixing_time_sec),
            ("fine_agg_moisture_pct", batch.fine_agg_moisture_pct),
            ("batch_temp_c", batch.batch_temp_c),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        for (key, value) in overrides {
            metrics.insert(key.clone(), *value);
        }

        Self {
            metrics,
            reference_time,
            batch: Some(batch.clone()),
            pour: Some(pour.clone()),
        }
    }

    /// Reported value for a metric name, if it is a finite number.
    pub fn reported(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().filter(|v| v.is_finite())
    }
}
