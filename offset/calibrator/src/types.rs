//! Userspace type definitions
//!
//! Defines the records produced by topology discovery and by a calibration
//! campaign, and the serializable report and matrix types used for export.

use ordo_common::{CoreId, PairKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One logical processor as seen by topology discovery
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CoreDescriptor {
    /// Logical processor number
    pub processor_id: CoreId,
    /// Physical package id, absent on platforms that do not expose it
    pub physical_id: Option<u32>,
    /// Hyperthread siblings, including the processor itself
    pub siblings: BTreeSet<CoreId>,
}

impl CoreDescriptor {
    /// A processor is primary when it is the lowest-numbered sibling
    pub fn is_primary(&self) -> bool {
        self.siblings
            .iter()
            .next()
            .map_or(true, |&lowest| lowest == self.processor_id)
    }
}

/// Reduced offset estimate for an unordered core pair
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairOffset {
    /// Lower core id
    pub core_a: CoreId,
    /// Higher core id
    pub core_b: CoreId,
    /// Minimum over both directions of the per-direction minimum
    pub min_offset: i64,
}

impl PairOffset {
    /// Build from the two directional minima; order of `a` and `b` is irrelevant
    pub fn from_directions(a: CoreId, b: CoreId, a_to_b: i64, b_to_a: i64) -> Self {
        let key = PairKey::new(a, b).normalized();
        Self {
            core_a: key.from,
            core_b: key.to,
            min_offset: a_to_b.min(b_to_a),
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.core_a, self.core_b)
    }
}

/// Calibration artifact written after a campaign
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CalibrationReport {
    /// RFC 3339 timestamp when the campaign finished
    pub timestamp: String,
    /// Rounds per probe invocation
    pub iterations: u64,
    /// Canonical visiting order of the campaign
    pub order: Vec<CoreId>,
    /// Every measured pair
    pub pairs: Vec<PairOffset>,
    /// Worst pairwise offset; the timestamping safety margin
    pub global_max_offset: Option<i64>,
    /// Pairs re-reduced from the store instead of probed
    pub resumed_pairs: usize,
}

/// Dense core × core offset matrix
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OffsetMatrix {
    pub core_count: usize,
    pub rows: Vec<Vec<i64>>,
}

impl OffsetMatrix {
    pub fn get(&self, row: usize, col: usize) -> Option<i64> {
        self.rows.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Largest off-diagonal cell
    pub fn max_offset(&self) -> Option<i64> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .filter(move |&(j, _)| i != j)
                    .map(|(_, &cell)| cell)
            })
            .max()
    }
}
