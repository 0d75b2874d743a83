//! Round-trip offset analysis
//!
//! Splits every logged exchange into its outbound and return legs, keeps
//! only exchanges whose legs are nearly symmetric, and reports the bounds
//! the accepted offsets converge to.
//!
//! Successive exchanges share one uncorrected counter, so responder
//! timestamps are shifted by the offset of the most recently accepted
//! exchange before the legs are derived. The state is an explicit
//! accumulator folded over the log; independent logs can be analyzed in
//! parallel.

use crate::error::{CalibrationError, Result};
use log::debug;
use ordo_common::{RawSample, RATIO_ACCEPT_MAX, RATIO_ACCEPT_MIN};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

/// Why an exchange is not causally consistent
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Corrected responder arrival precedes the requester departure
    NonPositiveOutbound,
    /// Requester arrival precedes the corrected responder departure
    NonPositiveReturn,
}

/// Exchange with a zero or negative leg; excluded from acceptance
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataIntegrityAnomaly {
    /// Position in the log
    pub index: usize,
    pub kind: AnomalyKind,
    pub outbound: f64,
    pub return_leg: f64,
}

/// Legs and derived metrics of one exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeMetrics {
    pub outbound: f64,
    pub return_leg: f64,
    /// Half the leg difference: responder clock minus requester clock
    pub offset: f64,
    /// `outbound * 100 / return`, truncated; undefined for a zero return leg
    pub ratio: Option<i64>,
    /// Uncorrected responder arrival minus requester departure
    pub rtt: i64,
}

impl ExchangeMetrics {
    /// Derive the metrics with responder timestamps shifted by `correction`
    pub fn derive(sample: &RawSample, correction: f64) -> Self {
        // Differences stay in i64; raw counters exceed f64's 53-bit mantissa
        let outbound = (sample.arrival1 - sample.departure1) as f64 - correction;
        let return_leg = (sample.arrival2 - sample.departure2) as f64 + correction;
        let ratio = (return_leg != 0.0).then(|| (outbound * 100.0 / return_leg) as i64);

        Self {
            outbound,
            return_leg,
            offset: (outbound - return_leg) / 2.0,
            ratio,
            rtt: sample.arrival1 - sample.departure1,
        }
    }

    fn anomaly(&self) -> Option<AnomalyKind> {
        if self.outbound <= 0.0 {
            Some(AnomalyKind::NonPositiveOutbound)
        } else if self.return_leg <= 0.0 {
            Some(AnomalyKind::NonPositiveReturn)
        } else {
            None
        }
    }
}

/// Whether a symmetry ratio lies in the acceptance band
pub fn ratio_accepted(ratio: i64) -> bool {
    (RATIO_ACCEPT_MIN..=RATIO_ACCEPT_MAX).contains(&ratio)
}

/// Outcome of analyzing one log
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    /// Smallest accepted offset; `None` when nothing was accepted
    pub offset_min: Option<f64>,
    /// Largest accepted offset; `None` when nothing was accepted
    pub offset_max: Option<f64>,
    /// Smallest uncorrected ping transit over all exchanges
    pub min_rtt: Option<i64>,
    /// Symmetry ratio → exchange count, every exchange with a defined ratio
    pub ratio_histogram: BTreeMap<i64, u64>,
    pub total: usize,
    pub accepted: usize,
    pub anomalies: Vec<DataIntegrityAnomaly>,
}

/// Fold accumulator
#[derive(Debug, Default)]
struct AnalysisState {
    correction: f64,
    result: AnalysisResult,
}

impl AnalysisState {
    fn observe(mut self, index: usize, sample: &RawSample) -> Self {
        let metrics = ExchangeMetrics::derive(sample, self.correction);
        let result = &mut self.result;

        result.total += 1;
        result.min_rtt = Some(result.min_rtt.map_or(metrics.rtt, |m| m.min(metrics.rtt)));
        if let Some(ratio) = metrics.ratio {
            *result.ratio_histogram.entry(ratio).or_insert(0) += 1;
        }

        if let Some(kind) = metrics.anomaly() {
            debug!(
                "exchange {}: {:?} (outbound {}, return {})",
                index, kind, metrics.outbound, metrics.return_leg
            );
            result.anomalies.push(DataIntegrityAnomaly {
                index,
                kind,
                outbound: metrics.outbound,
                return_leg: metrics.return_leg,
            });
            return self;
        }

        if metrics.ratio.is_some_and(ratio_accepted) {
            result.accepted += 1;
            let offset = metrics.offset;
            result.offset_min = Some(result.offset_min.map_or(offset, |m| m.min(offset)));
            result.offset_max = Some(result.offset_max.map_or(offset, |m| m.max(offset)));
            self.correction = metrics.offset;
        }
        self
    }
}

/// Analyze a log of exchanges
pub fn analyze(samples: &[RawSample]) -> AnalysisResult {
    samples
        .iter()
        .enumerate()
        .fold(AnalysisState::default(), |state, (index, sample)| {
            state.observe(index, sample)
        })
        .result
}

/// Parse a raw sample log, one exchange per line; blank lines are skipped
pub fn parse_log(text: &str) -> Result<Vec<RawSample>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            line.parse::<RawSample>().map_err(|e| {
                CalibrationError::InvalidInput(format!("line {}: {}", number + 1, e))
            })
        })
        .collect()
}

/// Read and parse a raw sample log file
pub fn read_log(path: &Path) -> Result<Vec<RawSample>> {
    let text = fs::read_to_string(path).map_err(|e| CalibrationError::io(path, e))?;
    parse_log(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEG: i64 = 1000;

    /// Exchange whose legs, under `correction`, are `out` and `ret`
    fn exchange(t0: i64, correction: i64, out: i64, ret: i64) -> RawSample {
        let arrival1 = t0 + out + correction;
        let departure2 = arrival1 + 40;
        RawSample {
            requester: 0,
            responder: 1,
            departure1: t0,
            arrival1,
            departure2,
            arrival2: departure2 - correction + ret,
        }
    }

    /// Symmetric-enough exchange with the given offset
    fn with_offset(t0: i64, correction: i64, offset: i64) -> RawSample {
        exchange(t0, correction, LEG + offset, LEG - offset)
    }

    #[test]
    fn test_exchange_metrics() {
        let metrics = ExchangeMetrics::derive(&exchange(500, 0, 1010, 990), 0.0);
        assert_eq!(metrics.outbound, 1010.0);
        assert_eq!(metrics.return_leg, 990.0);
        assert_eq!(metrics.offset, 10.0);
        assert_eq!(metrics.ratio, Some(102));
        assert_eq!(metrics.rtt, 1010);
    }

    #[test]
    fn test_large_counter_base_keeps_exact_legs() {
        // Three years of uptime at 1 GHz, well past 2^53
        let base = 94_608_000_000_000_001;
        let first = exchange(base, 0, 1010, 990);
        let metrics = ExchangeMetrics::derive(&first, 0.0);
        assert_eq!(metrics.outbound, 1010.0);
        assert_eq!(metrics.return_leg, 990.0);
        assert_eq!(metrics.offset, 10.0);
        assert_eq!(metrics.ratio, Some(102));

        let second = exchange(base + 5000, 10, 1005, 995);
        let result = analyze(&[first, second]);
        assert_eq!(result.accepted, 2);
        assert_eq!(result.offset_min, Some(5.0));
        assert_eq!(result.offset_max, Some(10.0));
        assert_eq!(result.ratio_histogram.get(&102), Some(&1));
        assert_eq!(result.ratio_histogram.get(&101), Some(&1));
        assert_eq!(result.min_rtt, Some(1010));
    }

    #[test]
    fn test_ratio_band_is_inclusive() {
        assert!(!ratio_accepted(96));
        assert!(ratio_accepted(97));
        assert!(ratio_accepted(100));
        assert!(ratio_accepted(103));
        assert!(!ratio_accepted(104));
    }

    #[test]
    fn test_ratio_100_accepted() {
        let result = analyze(&[exchange(0, 0, 1000, 1000)]);
        assert_eq!(result.accepted, 1);
        assert_eq!(result.offset_min, Some(0.0));
        assert_eq!(result.ratio_histogram.get(&100), Some(&1));
    }

    #[test]
    fn test_ratio_104_counted_but_not_accepted() {
        let result = analyze(&[exchange(0, 0, 1040, 1000)]);
        assert_eq!(result.accepted, 0);
        assert_eq!(result.offset_min, None);
        assert_eq!(result.offset_max, None);
        assert_eq!(result.ratio_histogram.get(&104), Some(&1));
        assert_eq!(result.total, 1);
    }

    #[test]
    fn test_accepted_offsets_with_one_asymmetric_exchange() {
        // Each accepted exchange is built against the correction left by
        // the previous accepted one
        let samples = vec![
            with_offset(0, 0, 10),
            with_offset(10_000, 10, 12),
            exchange(20_000, 12, 1200, 800),
            with_offset(30_000, 12, 11),
            with_offset(40_000, 11, 13),
            with_offset(50_000, 13, 10),
        ];

        let result = analyze(&samples);

        assert_eq!(result.total, 6);
        assert_eq!(result.accepted, 5);
        assert_eq!(result.offset_min, Some(10.0));
        assert_eq!(result.offset_max, Some(13.0));
        assert_eq!(result.ratio_histogram.get(&150), Some(&1));
        assert_eq!(result.ratio_histogram.get(&102), Some(&5));
        assert!(result.anomalies.is_empty());
        assert_eq!(result.min_rtt, Some(LEG + 10));
    }

    #[test]
    fn test_negative_leg_is_flagged_not_accepted() {
        // Outbound -1000, return -1000: ratio 100, yet clocks went backwards
        let backwards = exchange(0, 0, -1000, -1000);
        let result = analyze(&[backwards, with_offset(10_000, 0, 10)]);

        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].index, 0);
        assert_eq!(result.anomalies[0].kind, AnomalyKind::NonPositiveOutbound);
        assert_eq!(result.accepted, 1);
        assert_eq!(result.offset_min, Some(10.0));
        assert_eq!(result.ratio_histogram.get(&100), Some(&1));
        assert_eq!(result.ratio_histogram.get(&102), Some(&1));
    }

    #[test]
    fn test_zero_return_leg_has_no_ratio() {
        let result = analyze(&[exchange(0, 0, 1000, 0)]);
        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].kind, AnomalyKind::NonPositiveReturn);
        assert!(result.ratio_histogram.is_empty());
        assert_eq!(result.total, 1);
    }

    #[test]
    fn test_rejected_exchange_keeps_correction() {
        // The rejected exchange must not move the correction: the next
        // exchange is built against the correction of the first one
        let samples = vec![
            with_offset(0, 0, 14),
            exchange(10_000, 14, 1500, 1000),
            with_offset(20_000, 14, 5),
        ];
        let result = analyze(&samples);
        assert_eq!(result.accepted, 2);
        assert_eq!(result.offset_min, Some(5.0));
        assert_eq!(result.offset_max, Some(14.0));
    }

    #[test]
    fn test_empty_log() {
        let result = analyze(&[]);
        assert_eq!(result, AnalysisResult::default());
    }

    #[test]
    fn test_parse_log() {
        let text = "0 1 100 1150 1190 2170\n\n0 1 3000 4010 4050 5040\n";
        let samples = parse_log(text).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].departure1, 3000);

        match parse_log("0 1 100 1150 1190 2170\n0 1 2 3\n") {
            Err(CalibrationError::InvalidInput(msg)) => assert!(msg.starts_with("line 2")),
            other => panic!("expected invalid input, got {:?}", other),
        }
    }
}
