//! Offset table rendering and exporters
//!
//! Re-reduces the persisted per-direction samples into a core × core
//! matrix without re-measuring anything, and writes matrices, frequency
//! tables and calibration reports in text or JSON.

use crate::{
    error::{CalibrationError, Result as CalibrationResult},
    store::SampleStore,
    types::{CalibrationReport, OffsetMatrix},
};
use anyhow::{Context, Result};
use ordo_common::{CoreId, PairKey};
use std::{collections::BTreeMap, fs::File, io::Write, path::PathBuf};

/// Build the offset matrix for cores `0..core_count`
///
/// The diagonal is 0; cell (i, j) is the minimum stored sample of `i-j`.
pub fn render<S: SampleStore + ?Sized>(
    store: &S,
    core_count: usize,
) -> CalibrationResult<OffsetMatrix> {
    let mut rows = Vec::with_capacity(core_count);

    for i in 0..core_count {
        let mut row = Vec::with_capacity(core_count);
        for j in 0..core_count {
            if i == j {
                row.push(0);
                continue;
            }
            let key = PairKey::new(i as CoreId, j as CoreId);
            let samples = store.get(key)?;
            let min = samples
                .into_iter()
                .min()
                .ok_or(CalibrationError::MissingSample(key))?;
            row.push(min);
        }
        rows.push(row);
    }

    Ok(OffsetMatrix { core_count, rows })
}

/// Trait for matrix exporters
pub trait MatrixExporter {
    /// Write the matrix to `out`
    fn export(&self, matrix: &OffsetMatrix, out: &mut dyn Write) -> Result<()>;
}

/// Export format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterType {
    /// Space-separated rows
    Text,
    /// JSON document
    Json,
}

impl ExporterType {
    pub fn exporter(self) -> Box<dyn MatrixExporter> {
        match self {
            ExporterType::Text => Box::new(TextExporter),
            ExporterType::Json => Box::new(JsonExporter::new(true)),
        }
    }
}

/// One space-separated row per core, each cell followed by a space
pub struct TextExporter;

impl MatrixExporter for TextExporter {
    fn export(&self, matrix: &OffsetMatrix, out: &mut dyn Write) -> Result<()> {
        for row in &matrix.rows {
            for cell in row {
                write!(out, "{} ", cell).context("Failed to write matrix cell")?;
            }
            writeln!(out).context("Failed to write matrix row")?;
        }
        Ok(())
    }
}

/// JSON exporter
pub struct JsonExporter {
    pretty: bool,
}

impl JsonExporter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn to_json<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}

impl MatrixExporter for JsonExporter {
    fn export(&self, matrix: &OffsetMatrix, out: &mut dyn Write) -> Result<()> {
        let json = self.to_json(matrix)?;
        writeln!(out, "{}", json).context("Failed to write matrix JSON")?;
        Ok(())
    }
}

/// Writes a calibration report as JSON
pub struct ReportExporter {
    output_path: PathBuf,
    json: JsonExporter,
}

impl ReportExporter {
    /// Create a new report exporter
    ///
    /// # Arguments
    ///
    /// * `output_path` - Path to output file
    /// * `pretty` - Enable pretty-printing
    pub fn new(output_path: PathBuf, pretty: bool) -> Self {
        Self {
            output_path,
            json: JsonExporter::new(pretty),
        }
    }

    pub fn export(&self, report: &CalibrationReport) -> Result<()> {
        let json = self.json.to_json(report)?;

        let mut file = File::create(&self.output_path)
            .with_context(|| format!("Failed to create output file: {:?}", self.output_path))?;

        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write to output file: {:?}", self.output_path))?;

        Ok(())
    }
}

/// Two-column `value, count` table sorted by value
pub fn write_frequency_table(table: &BTreeMap<i64, u64>, out: &mut dyn Write) -> Result<()> {
    for (value, count) in table {
        writeln!(out, "{}, {}", value, count).context("Failed to write frequency table")?;
    }
    Ok(())
}
