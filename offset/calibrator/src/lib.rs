//! Cross-core clock-offset calibration
//!
//! Bounds the worst clock skew between any two physical cores, the safety
//! margin a timestamping scheme built on per-core cycle counters has to
//! tolerate.
//!
//! Pipeline: [`topology`] orders the cores, [`driver`] probes every pair
//! through a [`probe::Probe`] and persists raw samples in a
//! [`store::SampleStore`], [`analyzer`] and [`stats`] inspect samples
//! offline, and [`exporter`] renders the stored pairs as a matrix.

pub mod analyzer;
pub mod driver;
pub mod error;
pub mod exporter;
pub mod probe;
pub mod stats;
pub mod store;
pub mod topology;
pub mod types;

pub use analyzer::{analyze, AnalysisResult};
pub use driver::{CalibrationOutcome, ProbeDriver};
pub use error::{CalibrationError, Result};
pub use exporter::{render, ExporterType, JsonExporter, MatrixExporter, TextExporter};
pub use probe::{CommandProbe, Probe};
pub use store::{FsStore, MemoryStore, SampleStore};
pub use topology::{Sequencer, SysfsTopology};
pub use types::*;
