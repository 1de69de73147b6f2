//! Lineage Resolver
//!
//! Tracks where the material in each work unit came from:
//!
//! ```text
//! Vendor ──▶ MaterialLot ──▶ Batch ──▶ Pour ──▶ BlockLiftCell
//! ```
//!
//! Batches live in a fixed-size pool. `assign` hands out batches round-robin
//! and synthesizes a pour for the cell; `rotate` recycles the oldest batch to
//! the back of the pool. A recorded outcome stays visible on its batch until
//! the next assignment recycles it. Trace chains are joined on demand and
//! never stored.

pub mod readings;

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{Batch, BatchStatus, BlockLiftCell, MaterialLot, Pour, TraceChain, Vendor};
use readings::ReadingSource;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum LineageError {
    #[error("Lineage incomplete for batch {batch_id}: vendor/lot reference tables are empty")]
    Incomplete { batch_id: String },

    #[error("Batch pool is empty")]
    EmptyPool,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Reference table parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}

// ============================================================================
// Reference Tables
// ============================================================================

/// Vendor and material lot reference data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceTables {
    #[serde(default)]
    pub vendors: Vec<Vendor>,
    #[serde(default)]
    pub lots: Vec<MaterialLot>,
}

impl ReferenceTables {
    /// Built-in suppliers and lots, received in the days before `now`.
    pub fn builtin(now: DateTime<Utc>) -> Self {
        let vendor = |id: &str, name: &str, material: &str| Vendor {
            id: id.to_string(),
            name: name.to_string(),
            material: material.to_string(),
        };
        let lot = |id: &str, vendor_id: &str, material: &str, days_ago: i64| MaterialLot {
            id: id.to_string(),
            vendor_id: vendor_id.to_string(),
            material: material.to_string(),
            received_at: now - Duration::days(days_ago),
        };

        Self {
            vendors: vec![
                vendor("V-01", "Northgate Cement", "cement"),
                vendor("V-02", "Ridgeway Fly Ash", "fly ash"),
                vendor("V-03", "Basin Aggregates", "aggregate"),
                vendor("V-04", "Cryotek Admixtures", "admixture"),
            ],
            lots: vec![
                lot("L-2401", "V-01", "cement", 9),
                lot("L-2402", "V-03", "aggregate", 8),
                lot("L-2403", "V-02", "fly ash", 7),
                lot("L-2404", "V-03", "aggregate", 5),
                lot("L-2405", "V-01", "cement", 3),
                lot("L-2406", "V-04", "admixture", 2),
            ],
        }
    }

    /// Load reference tables from a JSON file with `vendors` and `lots` arrays.
    pub fn load_from_file(path: &Path) -> Result<Self, LineageError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty() || self.lots.is_empty()
    }

    pub fn vendor(&self, id: &str) -> Option<&Vendor> {
        self.vendors.iter().find(|v| v.id == id)
    }

    pub fn lot(&self, id: &str) -> Option<&MaterialLot> {
        self.lots.iter().find(|l| l.id == id)
    }
}

// ============================================================================
// Lineage Resolver
// ============================================================================

/// Owns the batch pool and the cell → pour → batch associations.
pub struct LineageResolver {
    tables: ReferenceTables,
    pool: VecDeque<Batch>,
    /// Round-robin position into `pool` for the next assignment
    cursor: usize,
    readings: Box<dyn ReadingSource>,
    pour_seq: u64,
    /// Latest pour assigned to each cell
    cell_pours: HashMap<String, Pour>,
    /// Batch each pour was made from
    pour_batches: HashMap<String, String>,
    /// An outcome was recorded; rotate before the next assignment
    recycle_due: bool,
}

impl std::fmt::Debug for LineageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineageResolver")
            .field("pool", &self.pool.len())
            .field("cursor", &self.cursor)
            .field("pours", &self.pour_seq)
            .field("readings", &self.readings.source_name())
            .finish()
    }
}

impl LineageResolver {
    /// Build the resolver and fill a pool of `pool_size` pending batches.
    pub fn new(
        tables: ReferenceTables,
        pool_size: usize,
        mut readings: Box<dyn ReadingSource>,
        now: DateTime<Utc>,
    ) -> Self {
        let pool = (0..pool_size)
            .map(|i| Self::make_batch(&tables, i, readings.as_mut(), now))
            .collect::<VecDeque<_>>();

        info!(
            pool_size = pool.len(),
            vendors = tables.vendors.len(),
            lots = tables.lots.len(),
            readings = readings.source_name(),
            "Lineage resolver ready"
        );

        Self {
            tables,
            pool,
            cursor: 0,
            readings,
            pour_seq: 0,
            cell_pours: HashMap::new(),
            pour_batches: HashMap::new(),
            recycle_due: false,
        }
    }

    fn make_batch(
        tables: &ReferenceTables,
        index: usize,
        readings: &mut dyn ReadingSource,
        now: DateTime<Utc>,
    ) -> Batch {
        // Two lots per batch (binder + aggregate), taken in rotation
        let lots: Vec<&MaterialLot> = if tables.lots.is_empty() {
            Vec::new()
        } else {
            let n = tables.lots.len();
            let mut picked = vec![&tables.lots[(2 * index) % n]];
            let second = &tables.lots[(2 * index + 1) % n];
            if second.id != picked[0].id {
                picked.push(second);
            }
            picked
        };

        let mut vendor_ids: Vec<String> = Vec::new();
        for lot in &lots {
            if !vendor_ids.contains(&lot.vendor_id) {
                vendor_ids.push(lot.vendor_id.clone());
            }
        }

        let mix = readings.batch_mix(index);
        Batch {
            id: format!("BT-{:04}", index + 1),
            lot_ids: lots.iter().map(|l| l.id.clone()).collect(),
            vendor_ids,
            started_at: now,
            status: BatchStatus::Pending,
            mixing_time_sec: mix.mixing_time_sec,
            fine_agg_moisture_pct: mix.fine_agg_moisture_pct,
            batch_temp_c: mix.batch_temp_c,
        }
    }

    /// Batches in pool order (oldest first)
    pub fn pool(&self) -> impl Iterator<Item = &Batch> {
        self.pool.iter()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn tables(&self) -> &ReferenceTables {
        &self.tables
    }

    pub fn batch(&self, id: &str) -> Option<&Batch> {
        self.pool.iter().find(|b| b.id == id)
    }

    /// Latest pour assigned to a cell
    pub fn pour_for_cell(&self, cell_id: &str) -> Option<&Pour> {
        self.cell_pours.get(cell_id)
    }

    /// Batch a pour was made from
    pub fn batch_for_pour(&self, pour_id: &str) -> Option<&Batch> {
        self.pour_batches.get(pour_id).and_then(|id| self.batch(id))
    }

    /// Pick the next batch round-robin and synthesize a pour for `cell`.
    /// A recycle left pending by [`Self::record_outcome`] runs first.
    pub fn assign(
        &mut self,
        cell: &BlockLiftCell,
        now: DateTime<Utc>,
    ) -> Result<(Pour, Batch), LineageError> {
        if self.pool.is_empty() {
            return Err(LineageError::EmptyPool);
        }
        if std::mem::take(&mut self.recycle_due) {
            self.rotate();
        }
        let index = self.cursor % self.pool.len();
        self.cursor = (index + 1) % self.pool.len();
        let batch = self.pool[index].clone();

        self.pour_seq += 1;
        let pour = Pour {
            id: format!("PR-{:05}", self.pour_seq),
            block: cell.block,
            lift: cell.lift,
            batch_id: batch.id.clone(),
            started_at: now,
            readings: self.readings.pour_readings(cell.block, cell.lift),
        };

        self.cell_pours.insert(cell.id.clone(), pour.clone());
        self.pour_batches.insert(pour.id.clone(), batch.id.clone());

        debug!(cell = %cell.id, pour = %pour.id, batch = %batch.id, "Batch assigned");
        Ok((pour, batch))
    }

    /// Move the oldest batch to the back of the pool and reset it to pending.
    /// Returns the id of the recycled batch.
    pub fn rotate(&mut self) -> Option<String> {
        let mut oldest = self.pool.pop_front()?;
        oldest.status = BatchStatus::Pending;
        let id = oldest.id.clone();
        self.pool.push_back(oldest);
        // Keep the cursor pointing at the same batch
        if !self.pool.is_empty() {
            self.cursor = (self.cursor + self.pool.len() - 1) % self.pool.len();
        }
        debug!(batch = %id, "Batch recycled");
        Some(id)
    }

    /// Record the outcome of a finished unit's batch and schedule the pool
    /// to recycle its oldest batch on the next assignment.
    pub fn record_outcome(&mut self, batch_id: &str, status: BatchStatus) -> bool {
        self.recycle_due = true;
        self.set_batch_status(batch_id, status)
    }

    /// Record the acceptance outcome of a batch. Returns false if not in the pool.
    pub fn set_batch_status(&mut self, batch_id: &str, status: BatchStatus) -> bool {
        match self.pool.iter_mut().find(|b| b.id == batch_id) {
            Some(batch) => {
                batch.status = status;
                true
            }
            None => false,
        }
    }

    /// Join a pour and its batch against the reference tables.
    ///
    /// Falls back to the first available lot/vendor when the batch's own
    /// references are missing. Fails only when the tables are empty.
    pub fn build_trace(
        &self,
        pour: &Pour,
        batch: &Batch,
        block_label: &str,
    ) -> Result<TraceChain, LineageError> {
        let incomplete = || LineageError::Incomplete {
            batch_id: batch.id.clone(),
        };

        let lot = batch
            .lot_ids
            .iter()
            .find_map(|id| self.tables.lot(id))
            .or_else(|| {
                debug!(batch = %batch.id, "Batch lots not in reference table, using first lot");
                self.tables.lots.first()
            })
            .ok_or_else(incomplete)?;

        let vendor = self
            .tables
            .vendor(&lot.vendor_id)
            .or_else(|| batch.vendor_ids.iter().find_map(|id| self.tables.vendor(id)))
            .or_else(|| {
                debug!(lot = %lot.id, "Lot vendor not in reference table, using first vendor");
                self.tables.vendors.first()
            })
            .ok_or_else(incomplete)?;

        Ok(TraceChain {
            vendor: vendor.clone(),
            lot: lot.clone(),
            batch: batch.clone(),
            pour: pour.clone(),
            block_label: block_label.to_string(),
            resolved: true,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::readings::FixedReadings;
    use super::*;

    fn resolver(pool_size: usize) -> LineageResolver {
        let now = Utc::now();
        LineageResolver::new(
            ReferenceTables::builtin(now),
            pool_size,
            Box::new(FixedReadings::nominal()),
            now,
        )
    }

    #[test]
    fn test_assign_round_robin_wraps() {
        let mut r = resolver(3);
        let cell = BlockLiftCell::new(1, 1);
        let ids: Vec<String> = (0..4)
            .map(|_| r.assign(&cell, Utc::now()).expect("assign").1.id)
            .collect();
        assert_eq!(ids, vec!["BT-0001", "BT-0002", "BT-0003", "BT-0001"]);
    }

    #[test]
    fn test_assign_records_associations() {
        let mut r = resolver(2);
        let cell = BlockLiftCell::new(2, 5);
        let (pour, batch) = r.assign(&cell, Utc::now()).expect("assign");
        assert_eq!(pour.block, 2);
        assert_eq!(pour.lift, 5);
        assert_eq!(pour.batch_id, batch.id);
        assert_eq!(r.pour_for_cell(&cell.id).map(|p| p.id.as_str()), Some(pour.id.as_str()));
        assert_eq!(r.batch_for_pour(&pour.id).map(|b| b.id.as_str()), Some(batch.id.as_str()));
    }

    #[test]
    fn test_full_rotation_restores_order_and_resets_status() {
        let mut r = resolver(5);
        let original: Vec<String> = r.pool().map(|b| b.id.clone()).collect();
        for id in &original {
            r.set_batch_status(id, BatchStatus::Accepted);
        }

        let mut recycled = Vec::new();
        for _ in 0..original.len() {
            recycled.push(r.rotate().expect("pool not empty"));
        }

        assert_eq!(recycled, original, "each batch recycled exactly once, oldest first");
        let after: Vec<String> = r.pool().map(|b| b.id.clone()).collect();
        assert_eq!(after, original);
        assert!(r.pool().all(|b| b.status == BatchStatus::Pending));
    }

    #[test]
    fn test_outcome_visible_until_next_assignment() {
        let mut r = resolver(3);
        let cell = BlockLiftCell::new(1, 1);
        let (_, first) = r.assign(&cell, Utc::now()).expect("assign");
        assert!(r.record_outcome(&first.id, BatchStatus::Failed));
        assert_eq!(r.batch(&first.id).map(|b| b.status), Some(BatchStatus::Failed));

        let (_, second) = r.assign(&cell, Utc::now()).expect("assign");
        assert_eq!(second.id, "BT-0002");
        assert_eq!(r.batch(&first.id).map(|b| b.status), Some(BatchStatus::Pending));
        let order: Vec<&str> = r.pool().map(|b| b.id.as_str()).collect();
        assert_eq!(order, vec!["BT-0002", "BT-0003", "BT-0001"]);
    }

    #[test]
    fn test_trace_resolves_vendor_and_lot() {
        let mut r = resolver(2);
        let cell = BlockLiftCell::new(1, 1);
        let (pour, batch) = r.assign(&cell, Utc::now()).expect("assign");
        let trace = r.build_trace(&pour, &batch, &cell.label()).expect("trace");
        assert!(trace.resolved);
        assert_eq!(trace.batch.id, batch.id);
        assert!(batch.lot_ids.contains(&trace.lot.id));
        assert_eq!(trace.vendor.id, trace.lot.vendor_id);
    }

    #[test]
    fn test_trace_falls_back_to_first_entries() {
        let r = resolver(1);
        let mut batch = r.pool().next().cloned().expect("one batch");
        batch.lot_ids = vec!["L-MISSING".to_string()];
        let pour = Pour {
            id: "PR-1".to_string(),
            block: 1,
            lift: 1,
            batch_id: batch.id.clone(),
            started_at: Utc::now(),
            readings: FixedReadings::nominal().pour,
        };
        let trace = r.build_trace(&pour, &batch, "Block 1 · Lift 1").expect("fallback");
        assert_eq!(trace.lot.id, "L-2401");
        assert_eq!(trace.vendor.id, "V-01");
    }

    #[test]
    fn test_trace_incomplete_when_tables_empty() {
        let now = Utc::now();
        let mut r = LineageResolver::new(
            ReferenceTables::default(),
            1,
            Box::new(FixedReadings::nominal()),
            now,
        );
        let cell = BlockLiftCell::new(1, 1);
        let (pour, batch) = r.assign(&cell, now).expect("assign works without tables");
        assert!(batch.lot_ids.is_empty());
        assert!(matches!(
            r.build_trace(&pour, &batch, "x"),
            Err(LineageError::Incomplete { .. })
        ));
    }

    #[test]
    fn test_empty_pool_rejects_assignment() {
        let mut r = resolver(0);
        assert!(matches!(
            r.assign(&BlockLiftCell::new(1, 1), Utc::now()),
            Err(LineageError::EmptyPool)
        ));
    }
}
