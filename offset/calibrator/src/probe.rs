//! External round-trip probe invocation
//!
//! The probe is run as `<program> [args...] <from> <to> <iterations>` and
//! must print exactly `iterations` integers on stdout. Anything else fails the pair;
//! an offset safety margin is never guessed.

use crate::error::{CalibrationError, Result};
use log::debug;
use ordo_common::PairKey;
use std::{
    ffi::OsString,
    path::PathBuf,
    process::{Command, Stdio},
};

/// One directional measurement between two cores
pub trait Probe {
    /// Run `iterations` round trips from `key.from` to `key.to`
    fn measure(&mut self, key: PairKey, iterations: u64) -> Result<Vec<i64>>;
}

impl<P: Probe + ?Sized> Probe for &mut P {
    fn measure(&mut self, key: PairKey, iterations: u64) -> Result<Vec<i64>> {
        (**self).measure(key, iterations)
    }
}

/// Probe backed by an external executable
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the core ids, e.g. a script for an
    /// interpreter or `--mode` for `ordo-probe`
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Probe for CommandProbe {
    fn measure(&mut self, key: PairKey, iterations: u64) -> Result<Vec<i64>> {
        debug!(
            "running {:?} {:?} {} {} {}",
            self.program, self.args, key.from, key.to, iterations
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(key.from.to_string())
            .arg(key.to.to_string())
            .arg(iterations.to_string())
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| {
                CalibrationError::probe(key, format!("cannot run {:?}: {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(CalibrationError::probe(
                key,
                format!("{:?} exited with {}", self.program, output.status),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(key, &stdout, iterations)
    }
}

/// Validate and parse the probe's stdout
pub fn parse_probe_output(key: PairKey, stdout: &str, iterations: u64) -> Result<Vec<i64>> {
    let samples = stdout
        .split_whitespace()
        .map(|token| {
            token
                .parse::<i64>()
                .map_err(|_| CalibrationError::probe(key, format!("malformed sample {:?}", token)))
        })
        .collect::<Result<Vec<_>>>()?;

    if samples.is_empty() {
        return Err(CalibrationError::probe(key, "probe printed no samples"));
    }
    if samples.len() as u64 != iterations {
        return Err(CalibrationError::probe(
            key,
            format!("expected {} samples, got {}", iterations, samples.len()),
        ));
    }
    Ok(samples)
}
