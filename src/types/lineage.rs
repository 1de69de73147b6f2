//! Lineage types: Vendor, MaterialLot, Batch, Pour, TraceChain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Reference Data
// ============================================================================

/// Material supplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    pub id: String,
    pub name: String,
    /// Material category supplied (cement, fly ash, aggregate, admixture)
    pub material: String,
}

/// A delivered lot of material from one vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialLot {
    pub id: String,
    pub vendor_id: String,
    pub material: String,
    pub received_at: DateTime<Utc>,
}

// ============================================================================
// Batch
// ============================================================================

/// Acceptance status of a production batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Pending,
    Accepted,
    Failed,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "pending"),
            BatchStatus::Accepted => write!(f, "accepted"),
            BatchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Mix measurements taken at the batching plant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMix {
    pub mixing_time_sec: f64,
    pub fine_agg_moisture_pct: f64,
    pub batch_temp_c: f64,
}

/// A production batch in the active pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub lot_ids: Vec<String>,
    pub vendor_ids: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub status: BatchStatus,
    pub mixing_time_sec: f64,
    pub fine_agg_moisture_pct: f64,
    pub batch_temp_c: f64,
}

// ============================================================================
// Pour
// ============================================================================

/// Field readings captured for one pour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PourReadings {
    pub pour_temp_c: f64,
    pub slump_mm: f64,
    pub wet_density_kg_m3: f64,
    pub air_content_pct: f64,
    pub conveyor_speed: f64,
    pub transport_speed: f64,
    pub lift_depth_m: f64,
    pub time_between_lifts_hr: f64,
    pub curing_days: f64,
}

/// A production event placing one batch into one block/lift cell.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pour {
    pub id: String,
    pub block: u32,
    pub lift: u32,
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    pub readings: PourReadings,
}

// ============================================================================
// Trace Chain
// ============================================================================

/// Vendor → lot → batch → pour join for one work unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceChain {
    pub vendor: Vendor,
    pub lot: MaterialLot,
    pub batch: Batch,
    pub pour: Pour,
    pub block_label: String,
    /// False when reference data was missing and placeholders were used
    #[serde(default = "default_resolved")]
    pub resolved: bool,
}

fn default_resolved() -> bool {
    true
}

impl TraceChain {
    /// Placeholder chain used when the reference tables are empty.
    pub fn unresolved(pour: &Pour, batch: &Batch, block_label: &str) -> Self {
        let vendor_id = batch
            .vendor_ids
            .first()
            .cloned()
            .unwrap_or_else(|| "UNRESOLVED".to_string());
        let lot_id = batch
            .lot_ids
            .first()
            .cloned()
            .unwrap_or_else(|| "UNRESOLVED".to_string());
        Self {
            vendor: Vendor {
                id: vendor_id.clone(),
                name: "Unresolved vendor".to_string(),
                material: "unknown".to_string(),
            },
            lot: MaterialLot {
                id: lot_id,
                vendor_id,
                material: "unknown".to_string(),
                received_at: batch.started_at,
            },
            batch: batch.clone(),
            pour: pour.clone(),
            block_label: block_label.to_string(),
            resolved: false,
        }
    }

    /// One-line human summary used in alarm trace messages
    pub fn summary(&self) -> String {
        format!(
            "{} → {} → {} → {} @ {}",
            self.vendor.name, self.lot.id, self.batch.id, self.pour.id, self.block_label
        )
    }
}
