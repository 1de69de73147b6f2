//! Metric resolution: reported values first, then the derivation table

use crate::types::{MetricKey, MetricsSnapshot, ValueSource};

/// Wet density (kg/m³) per MPa of 28-day compressive strength.
pub const DENSITY_PER_MPA: f64 = 82.0;

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Resolve the value a rule should be compared against.
///
/// Order:
/// 1. The metric as reported in the snapshot map
/// 2. The derivation table (`batch_temp_diff_c`, `compressive_strength_28d_mpa`,
///    and batch mix values read from the batch context)
/// 3. `0.0` tagged as [`ValueSource::Defaulted`]
pub fn resolve(metric: &MetricKey, snapshot: &MetricsSnapshot) -> (f64, ValueSource) {
    if let Some(v) = snapshot.reported(metric.as_str()) {
        return (v, ValueSource::Reported);
    }
    match derive(metric, snapshot) {
        Some(v) => (v, ValueSource::Derived),
        None => (0.0, ValueSource::Defaulted),
    }
}

/// Derivation table for metrics that are not reported directly.
fn derive(metric: &MetricKey, snapshot: &MetricsSnapshot) -> Option<f64> {
    match metric {
        MetricKey::BatchTempDiffC => {
            let batch_temp = snapshot
                .reported(MetricKey::BatchTempC.as_str())
                .or_else(|| snapshot.batch.as_ref().map(|b| b.batch_temp_c))?;
            let pour_temp = snapshot
                .reported(MetricKey::PourTempC.as_str())
                .or_else(|| snapshot.pour.as_ref().map(|p| p.readings.pour_temp_c))?;
            Some(round1(batch_temp - pour_temp))
        }
        MetricKey::CompressiveStrength28dMpa => {
            let density = snapshot
                .reported(MetricKey::WetDensityKgM3.as_str())
                .or_else(|| snapshot.pour.as_ref().map(|p| p.readings.wet_density_kg_m3))?;
            Some(round1(density / DENSITY_PER_MPA))
        }
        MetricKey::MixingTimeSec => snapshot.batch.as_ref().map(|b| b.mixing_time_sec),
        MetricKey::FineAggMoisturePct => snapshot.batch.as_ref().map(|b| b.fine_agg_moisture_pct),
        MetricKey::BatchTempC => snapshot.batch.as_ref().map(|b| b.batch_temp_c),
        MetricKey::PourTempC => snapshot.pour.as_ref().map(|p| p.readings.pour_temp_c),
        MetricKey::SlumpMm => snapshot.pour.as_ref().map(|p| p.readings.slump_mm),
        MetricKey::WetDensityKgM3 => snapshot.pour.as_ref().map(|p| p.readings.wet_density_kg_m3),
        MetricKey::AirContentPct => snapshot.pour.as_ref().map(|p| p.readings.air_content_pct),
        MetricKey::ConveyorSpeed => snapshot.pour.as_ref().map(|p| p.readings.conveyor_speed),
        MetricKey::TransportSpeed => snapshot.pour.as_ref().map(|p| p.readings.transport_speed),
        MetricKey::LiftDepthM => snapshot.pour.as_ref().map(|p| p.readings.lift_depth_m),
        MetricKey::TimeBetweenLiftsHr => {
            snapshot.pour.as_ref().map(|p| p.readings.time_between_lifts_hr)
        }
        MetricKey::CuringDays => snapshot.pour.as_ref().map(|p| p.readings.curing_days),
        MetricKey::Other(_) => None,
    }
}
