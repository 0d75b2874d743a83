//! All-pairs calibration campaign
//!
//! Visits every unordered pair of the canonical order, probes both
//! directions one after the other, persists the raw samples and reduces
//! them to a pair offset and a running global maximum. Pairs are never
//! probed concurrently: parallel probes would contend for the interconnect
//! and bias the latencies being calibrated.

use crate::{
    error::{CalibrationError, Result},
    probe::Probe,
    store::SampleStore,
    types::{CalibrationReport, CoreDescriptor, PairOffset},
};
use log::{debug, info};
use ordo_common::{CoreId, PairKey};
use std::collections::BTreeMap;

/// Result of one campaign
#[derive(Debug, Clone, Default)]
pub struct CalibrationOutcome {
    /// Canonical order the campaign visited
    pub order: Vec<CoreId>,
    /// Pair offsets keyed by the normalized (lower id first) pair
    pub pairs: BTreeMap<PairKey, PairOffset>,
    /// Running maximum of all pair offsets; `None` with fewer than two cores
    pub global_max: Option<i64>,
    /// Pairs reduced from stored samples instead of being probed
    pub resumed: usize,
}

impl CalibrationOutcome {
    /// Offset of a pair, in either order
    pub fn offset(&self, a: CoreId, b: CoreId) -> Option<i64> {
        self.pairs
            .get(&PairKey::new(a, b).normalized())
            .map(|pair| pair.min_offset)
    }

    /// Global maximum recomputed from the pair map
    pub fn recompute_global_max(&self) -> Option<i64> {
        self.pairs.values().map(|pair| pair.min_offset).max()
    }

    pub fn to_report(&self, iterations: u64) -> CalibrationReport {
        CalibrationReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            iterations,
            order: self.order.clone(),
            pairs: self.pairs.values().copied().collect(),
            global_max_offset: self.global_max,
            resumed_pairs: self.resumed,
        }
    }
}

/// Drives the probe over all pairs and owns the campaign's results
pub struct ProbeDriver<P, S> {
    probe: P,
    store: S,
    resume: bool,
}

impl<P: Probe, S: SampleStore> ProbeDriver<P, S> {
    /// Create a new driver
    ///
    /// # Arguments
    ///
    /// * `probe` - Directional offset probe
    /// * `store` - Raw sample store receiving every direction's samples
    pub fn new(probe: P, store: S) -> Self {
        Self {
            probe,
            store,
            resume: false,
        }
    }

    /// Reuse stored samples for pairs whose two directions are already present
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Calibrate every unordered pair of `order`
    ///
    /// The first failing direction aborts the campaign with
    /// `ProbeExecutionFailed`; pairs stored before it stay in the store.
    pub fn calibrate_all(
        &mut self,
        order: &[CoreDescriptor],
        iterations: u64,
    ) -> Result<CalibrationOutcome> {
        if iterations == 0 {
            return Err(CalibrationError::InvalidInput(
                "iterations must be at least 1".to_string(),
            ));
        }

        let cores: Vec<CoreId> = order.iter().map(|c| c.processor_id).collect();
        let total_pairs = cores.len() * cores.len().saturating_sub(1) / 2;
        info!(
            "Calibrating {} pairs over {} cores, {} rounds per direction",
            total_pairs,
            cores.len(),
            iterations
        );

        let mut outcome = CalibrationOutcome {
            order: cores.clone(),
            ..Default::default()
        };

        for (i, &a) in cores.iter().enumerate() {
            for &b in &cores[i + 1..] {
                let key = PairKey::new(a, b).normalized();
                let pair = self.calibrate_pair(key, iterations, &mut outcome)?;

                outcome.global_max = Some(
                    outcome
                        .global_max
                        .map_or(pair.min_offset, |max| max.max(pair.min_offset)),
                );
                outcome.pairs.insert(key, pair);
                info!(
                    "({}, {}) ... done, offset {} [{}/{}]",
                    a,
                    b,
                    pair.min_offset,
                    outcome.pairs.len(),
                    total_pairs
                );
            }
        }

        match outcome.global_max {
            Some(max) => info!("Global maximum offset: {}", max),
            None => info!("Fewer than two cores, nothing to calibrate"),
        }
        Ok(outcome)
    }

    fn calibrate_pair(
        &mut self,
        key: PairKey,
        iterations: u64,
        outcome: &mut CalibrationOutcome,
    ) -> Result<PairOffset> {
        let back = key.reversed();

        if self.resume && self.store.contains(key) && self.store.contains(back) {
            debug!("resuming {} from stored samples", key);
            let forward = min_of(key, &self.store.get(key)?)?;
            let backward = min_of(back, &self.store.get(back)?)?;
            outcome.resumed += 1;
            return Ok(PairOffset::from_directions(key.from, key.to, forward, backward));
        }

        let forward = self.measure_direction(key, iterations)?;
        let backward = self.measure_direction(back, iterations)?;
        Ok(PairOffset::from_directions(key.from, key.to, forward, backward))
    }

    /// Probe one direction, persist its samples, return their minimum
    fn measure_direction(&mut self, key: PairKey, iterations: u64) -> Result<i64> {
        let samples = self.probe.measure(key, iterations)?;
        self.store.put(key, &samples)?;
        min_of(key, &samples)
    }
}

fn min_of(key: PairKey, samples: &[i64]) -> Result<i64> {
    samples
        .iter()
        .copied()
        .min()
        .ok_or_else(|| CalibrationError::InvalidInput(format!("no samples for pair {}", key)))
}
