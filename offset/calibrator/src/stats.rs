//! Order statistics over sample sets
//!
//! All helpers reject empty input: a calibration decision fed a default
//! zero would under-estimate the safety margin.

use crate::error::{CalibrationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Median of the values
///
/// Even counts average the two central elements.
pub fn median(values: &[i64]) -> Result<f64> {
    non_empty(values, "median")?;

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;

    if sorted.len() % 2 == 0 {
        Ok((sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0)
    } else {
        Ok(sorted[mid] as f64)
    }
}

/// Occurrence count of each distinct value, ascending by value
pub fn frequency_table<T: Ord + Copy>(values: &[T]) -> Result<BTreeMap<T, u64>> {
    non_empty(values, "frequency table")?;

    let mut table = BTreeMap::new();
    for &value in values {
        *table.entry(value).or_insert(0) += 1;
    }
    Ok(table)
}

/// Smallest and largest value
pub fn min_max(values: &[i64]) -> Result<(i64, i64)> {
    non_empty(values, "min/max")?;

    let mut min = values[0];
    let mut max = values[0];
    for &value in &values[1..] {
        min = min.min(value);
        max = max.max(value);
    }
    Ok((min, max))
}

/// Summary of one scalar sample file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SampleSummary {
    pub count: usize,
    pub min: i64,
    pub max: i64,
    pub median: f64,
}

pub fn summarize(values: &[i64]) -> Result<SampleSummary> {
    let (min, max) = min_max(values)?;
    Ok(SampleSummary {
        count: values.len(),
        min,
        max,
        median: median(values)?,
    })
}

fn non_empty<T>(values: &[T], what: &str) -> Result<()> {
    if values.is_empty() {
        return Err(CalibrationError::InvalidInput(format!(
            "{} of an empty sample set",
            what
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[1, 2, 3, 4]).unwrap(), 2.5);
        assert_eq!(median(&[1, 2, 3]).unwrap(), 2.0);
        assert_eq!(median(&[4, 1, 3, 2]).unwrap(), 2.5);
        assert_eq!(median(&[7]).unwrap(), 7.0);
        assert_eq!(median(&[-3, -1]).unwrap(), -2.0);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(matches!(median(&[]), Err(CalibrationError::InvalidInput(_))));
        assert!(matches!(min_max(&[]), Err(CalibrationError::InvalidInput(_))));
        assert!(matches!(
            frequency_table::<i64>(&[]),
            Err(CalibrationError::InvalidInput(_))
        ));
        assert!(summarize(&[]).is_err());
    }

    #[test]
    fn test_frequency_table_is_ordered() {
        let table = frequency_table(&[5, -2, 5, 3, 5, -2]).unwrap();
        let entries: Vec<_> = table.into_iter().collect();
        assert_eq!(entries, vec![(-2, 2), (3, 1), (5, 3)]);
    }

    #[test]
    fn test_summary() {
        let summary = summarize(&[40, 12, 95, 12, 33]).unwrap();
        assert_eq!(summary.count, 5);
        assert_eq!(summary.min, 12);
        assert_eq!(summary.max, 95);
        assert_eq!(summary.median, 33.0);
    }
}
