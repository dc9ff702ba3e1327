use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bytes per configured megabyte of capacity.
const BUDGET_FACTOR: i64 = 1024 * 2014;

/// Tunables of a single cache instance.
///
/// The options travel inside every snapshot, so a restored cache keeps the
/// segment layout its entries were placed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Global byte budget in (nominal) megabytes, split evenly across segments.
    pub max_entry_size_mb: i64,
    /// Upper bound of evictions in one segment sweep.
    pub max_gc_count: usize,
    pub gc_interval_minutes: u64,
    pub dump_file: PathBuf,
    pub dump_interval_secs: u64,
    /// Initial capacity of each segment map.
    pub map_size_of_segment: usize,
    /// Number of segments; must be a power of two.
    pub segment_count: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_entry_size_mb: 4,
            max_gc_count: 10,
            gc_interval_minutes: 60,
            dump_file: PathBuf::from("kafo.dump"),
            dump_interval_secs: 30,
            map_size_of_segment: 256,
            segment_count: 1024,
        }
    }
}

impl CacheOptions {
    /// Byte budget of one segment (keys plus values).
    ///
    /// The `1024 * 2014` factor is the historical contract for capacity
    /// rejection and is kept as is.
    pub fn segment_budget(&self) -> i64 {
        self.max_entry_size_mb * BUDGET_FACTOR / self.segment_count as i64
    }

    pub fn validate(&self) -> Result<()> {
        if self.segment_count == 0 || !self.segment_count.is_power_of_two() {
            return Err(Error::Config(format!(
                "segment count must be a power of two, got {}",
                self.segment_count
            )));
        }
        if self.max_entry_size_mb < 0 {
            return Err(Error::Config("max entry size must not be negative".into()));
        }
        if self.max_entry_size_mb.checked_mul(BUDGET_FACTOR).is_none() {
            return Err(Error::Config(format!(
                "max entry size {} MB is too large",
                self.max_entry_size_mb
            )));
        }
        if self.max_gc_count == 0 {
            return Err(Error::Config("max gc count must be at least 1".into()));
        }
        if self.gc_interval_minutes == 0 || self.dump_interval_secs == 0 {
            return Err(Error::Config("gc and dump intervals must be non-zero".into()));
        }
        Ok(())
    }
}
