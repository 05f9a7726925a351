//! Edge content caching.
//!
//! Each edge node owns one [`ArcCache`], an Adaptive Replacement Cache keyed by
//! content id. The cache itself is a plain single-owner structure; the edge
//! node wraps it in a mutex so lookups and admissions are critical sections.

pub mod arc;

pub use arc::{ArcCache, ArcList, Lookup};

use serde::{Deserialize, Serialize};

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from T1 or T2.
    pub hits: u64,
    /// Lookups that found nothing resident.
    pub misses: u64,
    /// Payloads admitted after an origin fetch.
    pub admissions: u64,
    /// Resident entries evicted (into a ghost list or dropped).
    pub evictions: u64,
    /// Admissions of ids found in the recency ghost list (B1).
    pub recency_ghost_hits: u64,
    /// Admissions of ids found in the frequency ghost list (B2).
    pub frequency_ghost_hits: u64,
    /// Entries currently resident.
    pub entries: usize,
    /// Maximum resident entries.
    pub capacity: usize,
    /// Current target size of T1.
    pub target_t1: usize,
}

impl CacheStats {
    /// Calculate hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    /// Calculate fill ratio.
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.entries as f64 / self.capacity as f64
    }
}
