//! Reading sources for synthesized pours and batch mixes.
//!
//! [`RandomReadings`] draws each value from a normal distribution centred on
//! its documented range and clamps it into the range. [`FixedReadings`]
//! returns the same values every time for deterministic tests.

use rand::prelude::*;
use rand_distr::{Distribution, Normal};

use crate::evaluator::metrics::round1;
use crate::types::{BatchMix, PourReadings};

/// Inclusive bounds for one synthesized reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingRange {
    pub low: f64,
    pub high: f64,
}

impl ReadingRange {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Documented ranges for synthesized readings
pub mod ranges {
    use super::ReadingRange;

    /// Placing temperature (°C)
    pub const POUR_TEMP_C: ReadingRange = ReadingRange::new(6.0, 13.0);
    /// Slump at discharge (mm)
    pub const SLUMP_MM: ReadingRange = ReadingRange::new(15.0, 65.0);
    /// Fresh wet density (kg/m³)
    pub const WET_DENSITY_KG_M3: ReadingRange = ReadingRange::new(2330.0, 2480.0);
    /// Entrained air (%)
    pub const AIR_CONTENT_PCT: ReadingRange = ReadingRange::new(2.5, 6.5);
    /// Conveyor belt speed (m/s)
    pub const CONVEYOR_SPEED: ReadingRange = ReadingRange::new(0.8, 3.2);
    /// Haul vehicle speed (km/h)
    pub const TRANSPORT_SPEED: ReadingRange = ReadingRange::new(10.0, 28.0);
    /// Lift depth (m)
    pub const LIFT_DEPTH_M: ReadingRange = ReadingRange::new(1.5, 3.2);
    /// Interval since the previous lift (h)
    pub const TIME_BETWEEN_LIFTS_HR: ReadingRange = ReadingRange::new(48.0, 110.0);
    /// Moist curing applied (days)
    pub const CURING_DAYS: ReadingRange = ReadingRange::new(14.0, 28.0);
    /// Mixing time at the plant (s)
    pub const MIXING_TIME_SEC: ReadingRange = ReadingRange::new(80.0, 150.0);
    /// Fine aggregate moisture (%)
    pub const FINE_AGG_MOISTURE_PCT: ReadingRange = ReadingRange::new(1.5, 7.0);
    /// Batch temperature at the plant (°C)
    pub const BATCH_TEMP_C: ReadingRange = ReadingRange::new(8.0, 16.0);
}

/// Pluggable supplier of readings for new pours and batches.
pub trait ReadingSource: Send + 'static {
    /// Readings for a pour into (block, lift)
    fn pour_readings(&mut self, block: u32, lift: u32) -> PourReadings;

    /// Mix measurements for the batch at pool position `index`
    fn batch_mix(&mut self, index: usize) -> BatchMix;

    /// Human-readable name for logging
    fn source_name(&self) -> &str;
}

// ============================================================================
// Random Source
// ============================================================================

/// Seedable random readings bounded by [`ranges`].
pub struct RandomReadings {
    rng: StdRng,
}

impl RandomReadings {
    /// `Some(seed)` for reproducible runs, `None` to seed from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    fn sample(&mut self, range: ReadingRange) -> f64 {
        let mean = (range.low + range.high) / 2.0;
        let std_dev = (range.high - range.low) / 6.0;
        match Normal::new(mean, std_dev) {
            Ok(dist) => round1(dist.sample(&mut self.rng).clamp(range.low, range.high)),
            Err(_) => mean,
        }
    }
}

impl ReadingSource for RandomReadings {
    fn pour_readings(&mut self, _block: u32, _lift: u32) -> PourReadings {
        PourReadings {
            pour_temp_c: self.sample(ranges::POUR_TEMP_C),
            slump_mm: self.sample(ranges::SLUMP_MM),
            wet_density_kg_m3: self.sample(ranges::WET_DENSITY_KG_M3),
            air_content_pct: self.sample(ranges::AIR_CONTENT_PCT),
            conveyor_speed: self.sample(ranges::CONVEYOR_SPEED),
            transport_speed: self.sample(ranges::TRANSPORT_SPEED),
            lift_depth_m: self.sample(ranges::LIFT_DEPTH_M),
            time_between_lifts_hr: self.sample(ranges::TIME_BETWEEN_LIFTS_HR),
            curing_days: self.sample(ranges::CURING_DAYS).round(),
        }
    }

    fn batch_mix(&mut self, _index: usize) -> BatchMix {
        BatchMix {
            mixing_time_sec: self.sample(ranges::MIXING_TIME_SEC).round(),
            fine_agg_moisture_pct: self.sample(ranges::FINE_AGG_MOISTURE_PCT),
            batch_temp_c: self.sample(ranges::BATCH_TEMP_C),
        }
    }

    fn source_name(&self) -> &str {
        "random"
    }
}

// ============================================================================
// Fixed Source
// ============================================================================

/// Returns the same readings for every pour and batch.
#[derive(Debug, Clone)]
pub struct FixedReadings {
    pub pour: PourReadings,
    pub mix: BatchMix,
}

impl FixedReadings {
    /// Mid-range values that satisfy the bundled catalog in every month.
    pub fn nominal() -> Self {
        Self {
            pour: PourReadings {
                pour_temp_c: 10.0,
                slump_mm: 40.0,
                wet_density_kg_m3: 2420.0,
                air_content_pct: 4.5,
                conveyor_speed: 2.0,
                transport_speed: 15.0,
                lift_depth_m: 2.5,
                time_between_lifts_hr: 72.0,
                curing_days: 28.0,
            },
            mix: BatchMix {
                mixing_time_sec: 120.0,
                fine_agg_moisture_pct: 4.0,
                batch_temp_c: 12.0,
            },
        }
    }

    pub fn with_pour(mut self, edit: impl FnOnce(&mut PourReadings)) -> Self {
        edit(&mut self.pour);
        self
    }

    pub fn with_mix(mut self, edit: impl FnOnce(&mut BatchMix)) -> Self {
        edit(&mut self.mix);
        self
    }
}

impl ReadingSource for FixedReadings {
    fn pour_readings(&mut self, _block: u32, _lift: u32) -> PourReadings {
        self.pour
    }

    fn batch_mix(&mut self, _index: usize) -> BatchMix {
        self.mix
    }

    fn source_name(&self) -> &str {
        "fixed"
    }
}
