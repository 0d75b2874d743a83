//! Error taxonomy of the calibration pipeline
//!
//! Topology failures abort the whole run; probe failures abort the campaign
//! at the failing pair, leaving already persisted pairs intact. Analysis
//! anomalies are not errors: the analyzer records them in its result.

use ordo_common::{CoreId, PairKey};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalibrationError {
    /// Processors or their topology could not be enumerated
    #[error("CPU topology unavailable: {reason}")]
    TopologyUnavailable { reason: String },

    /// One probe direction failed; re-run with resume to continue
    #[error("probe {from} -> {to} failed: {reason}")]
    ProbeExecutionFailed {
        from: CoreId,
        to: CoreId,
        reason: String,
    },

    /// Empty sample set or malformed sample text
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The store has no entry for this direction
    #[error("no samples stored for pair {0}")]
    MissingSample(PairKey),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CalibrationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn probe(key: PairKey, reason: impl Into<String>) -> Self {
        Self::ProbeExecutionFailed {
            from: key.from,
            to: key.to,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CalibrationError>;
