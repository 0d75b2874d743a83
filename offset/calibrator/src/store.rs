//! Pair-indexed raw sample store
//!
//! Each probe direction is stored once, in full, under its `"<from>-<to>"`
//! key. Both the driver's reduction and any offline re-analysis read back
//! from here, so the backing storage is behind a trait.

use crate::error::{CalibrationError, Result};
use log::debug;
use ordo_common::{PairKey, SAMPLE_FILE_EXTENSION};
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Storage for per-direction scalar samples
pub trait SampleStore {
    /// Store the complete sample set of one direction
    fn put(&mut self, key: PairKey, samples: &[i64]) -> Result<()>;

    /// Read back a direction's samples; `MissingSample` when absent
    fn get(&self, key: PairKey) -> Result<Vec<i64>>;

    /// Whether a direction has been stored
    fn contains(&self, key: PairKey) -> bool;
}

impl<S: SampleStore + ?Sized> SampleStore for &mut S {
    fn put(&mut self, key: PairKey, samples: &[i64]) -> Result<()> {
        (**self).put(key, samples)
    }

    fn get(&self, key: PairKey) -> Result<Vec<i64>> {
        (**self).get(key)
    }

    fn contains(&self, key: PairKey) -> bool {
        (**self).contains(key)
    }
}

/// One `<from>-<to>.txt` file per direction, one decimal integer per line
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store, creating its directory if needed
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CalibrationError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Open an existing store for reading
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: PairKey) -> PathBuf {
        self.root.join(format!("{}.{}", key, SAMPLE_FILE_EXTENSION))
    }
}

impl SampleStore for FsStore {
    fn put(&mut self, key: PairKey, samples: &[i64]) -> Result<()> {
        let text: String = samples.iter().map(|s| format!("{}\n", s)).collect();

        // Publish with a rename so an interrupted run never leaves a
        // truncated entry that resume would trust
        let path = self.path_for(key);
        let staging = path.with_extension("partial");
        fs::write(&staging, text).map_err(|e| CalibrationError::io(&staging, e))?;
        fs::rename(&staging, &path).map_err(|e| CalibrationError::io(&path, e))?;

        debug!("stored {} samples in {:?}", samples.len(), path);
        Ok(())
    }

    fn get(&self, key: PairKey) -> Result<Vec<i64>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => parse_samples(&text, &path.display().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CalibrationError::MissingSample(key)),
            Err(e) => Err(CalibrationError::io(&path, e)),
        }
    }

    fn contains(&self, key: PairKey) -> bool {
        self.path_for(key).is_file()
    }
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<PairKey, Vec<i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SampleStore for MemoryStore {
    fn put(&mut self, key: PairKey, samples: &[i64]) -> Result<()> {
        self.entries.insert(key, samples.to_vec());
        Ok(())
    }

    fn get(&self, key: PairKey) -> Result<Vec<i64>> {
        self.entries
            .get(&key)
            .cloned()
            .ok_or(CalibrationError::MissingSample(key))
    }

    fn contains(&self, key: PairKey) -> bool {
        self.entries.contains_key(&key)
    }
}

/// Read a standalone scalar sample file
pub fn read_samples(path: &Path) -> Result<Vec<i64>> {
    let text = fs::read_to_string(path).map_err(|e| CalibrationError::io(path, e))?;
    parse_samples(&text, &path.display().to_string())
}

/// Parse whitespace-separated decimal integers; `origin` names the source in errors
pub fn parse_samples(text: &str, origin: &str) -> Result<Vec<i64>> {
    text.split_whitespace()
        .map(|token| {
            token.parse().map_err(|_| {
                CalibrationError::InvalidInput(format!("{}: {:?} is not an integer", origin, token))
            })
        })
        .collect()
}
