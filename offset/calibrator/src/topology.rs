//! CPU topology discovery and canonical core ordering
//!
//! Reads the processor list from `/proc/cpuinfo` and hyperthread siblings
//! from sysfs, keeps one processor per physical core, and orders them so
//! the all-pairs campaign visits the boot package before crossing sockets.

use crate::{
    error::{CalibrationError, Result},
    types::CoreDescriptor,
};
use log::{debug, info};
use ordo_common::CoreId;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::ErrorKind,
    path::PathBuf,
};

pub const DEFAULT_CPUINFO: &str = "/proc/cpuinfo";
pub const DEFAULT_CPU_ROOT: &str = "/sys/devices/system/cpu";

/// One processor block of `/proc/cpuinfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorRecord {
    pub processor_id: CoreId,
    pub physical_id: Option<u32>,
}

/// Where processor records and sibling sets come from
pub trait TopologySource {
    /// All logical processors in OS enumeration order
    fn processors(&self) -> Result<Vec<ProcessorRecord>>;

    /// Thread siblings of a processor, `None` when the OS does not expose them
    fn thread_siblings(&self, processor: CoreId) -> Result<Option<BTreeSet<CoreId>>>;
}

/// Topology read from procfs and sysfs
#[derive(Debug, Clone)]
pub struct SysfsTopology {
    cpuinfo: PathBuf,
    cpu_root: PathBuf,
}

impl Default for SysfsTopology {
    fn default() -> Self {
        Self::new(DEFAULT_CPUINFO, DEFAULT_CPU_ROOT)
    }
}

impl SysfsTopology {
    /// Create a source rooted at custom paths
    ///
    /// # Arguments
    ///
    /// * `cpuinfo` - File in `/proc/cpuinfo` format
    /// * `cpu_root` - Directory laid out like `/sys/devices/system/cpu`
    pub fn new(cpuinfo: impl Into<PathBuf>, cpu_root: impl Into<PathBuf>) -> Self {
        Self {
            cpuinfo: cpuinfo.into(),
            cpu_root: cpu_root.into(),
        }
    }

    fn siblings_path(&self, processor: CoreId) -> PathBuf {
        self.cpu_root
            .join(format!("cpu{}", processor))
            .join("topology")
            .join("thread_siblings_list")
    }
}

impl TopologySource for SysfsTopology {
    fn processors(&self) -> Result<Vec<ProcessorRecord>> {
        let text = fs::read_to_string(&self.cpuinfo).map_err(|e| {
            CalibrationError::TopologyUnavailable {
                reason: format!("cannot read {:?}: {}", self.cpuinfo, e),
            }
        })?;
        parse_cpuinfo(&text)
    }

    fn thread_siblings(&self, processor: CoreId) -> Result<Option<BTreeSet<CoreId>>> {
        let path = self.siblings_path(processor);
        match fs::read_to_string(&path) {
            Ok(text) => parse_cpu_list(&text).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CalibrationError::TopologyUnavailable {
                reason: format!("cannot read {:?}: {}", path, e),
            }),
        }
    }
}

/// Parse `/proc/cpuinfo` into processor records
///
/// Blocks without a `processor` line (architecture headers) are skipped.
pub fn parse_cpuinfo(text: &str) -> Result<Vec<ProcessorRecord>> {
    let mut records = Vec::new();

    for block in text.split("\n\n").filter(|b| !b.trim().is_empty()) {
        let mut processor_id = None;
        let mut physical_id = None;

        for line in block.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key.trim() {
                "processor" => processor_id = Some(parse_field(key, value)?),
                "physical id" => physical_id = Some(parse_field(key, value)?),
                _ => {}
            }
        }

        if let Some(processor_id) = processor_id {
            records.push(ProcessorRecord {
                processor_id,
                physical_id,
            });
        }
    }

    if records.is_empty() {
        return Err(CalibrationError::TopologyUnavailable {
            reason: "no processor entries found".to_string(),
        });
    }
    Ok(records)
}

fn parse_field(key: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| CalibrationError::TopologyUnavailable {
            reason: format!("bad `{}` value {:?}", key.trim(), value.trim()),
        })
}

/// Parse a kernel cpulist such as `0,4` or `0-3,8-11`
pub fn parse_cpu_list(text: &str) -> Result<BTreeSet<CoreId>> {
    let bad = || CalibrationError::TopologyUnavailable {
        reason: format!("bad cpu list {:?}", text.trim()),
    };

    let mut cpus = BTreeSet::new();
    for part in text.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: CoreId = lo.trim().parse().map_err(|_| bad())?;
                let hi: CoreId = hi.trim().parse().map_err(|_| bad())?;
                if lo > hi {
                    return Err(bad());
                }
                cpus.extend(lo..=hi);
            }
            None => {
                cpus.insert(part.trim().parse().map_err(|_| bad())?);
            }
        }
    }

    if cpus.is_empty() {
        return Err(bad());
    }
    Ok(cpus)
}

/// Produces the canonical visiting order of physical cores
pub struct Sequencer<S> {
    source: S,
}

impl<S: TopologySource> Sequencer<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Discover primaries and return them in canonical order
    pub fn discover(&self) -> Result<Vec<CoreDescriptor>> {
        let records = self.source.processors()?;
        info!("Found {} logical processors", records.len());

        let mut primaries = Vec::new();
        for record in records {
            let siblings = self
                .source
                .thread_siblings(record.processor_id)?
                .unwrap_or_else(|| BTreeSet::from([record.processor_id]));

            let descriptor = CoreDescriptor {
                processor_id: record.processor_id,
                physical_id: record.physical_id,
                siblings,
            };
            if descriptor.is_primary() {
                primaries.push(descriptor);
            } else {
                debug!(
                    "skipping secondary hyperthread {}",
                    descriptor.processor_id
                );
            }
        }

        let order = canonical_order(primaries);
        info!("Canonical order covers {} physical cores", order.len());
        Ok(order)
    }
}

/// Order primaries: ungrouped first, then processor 0's package, then the
/// other packages by ascending id; enumeration order within a package
pub fn canonical_order(primaries: Vec<CoreDescriptor>) -> Vec<CoreDescriptor> {
    let mut order = Vec::with_capacity(primaries.len());
    let mut packages: BTreeMap<u32, Vec<CoreDescriptor>> = BTreeMap::new();
    let mut boot_package = None;

    for core in primaries {
        match core.physical_id {
            Some(package) => {
                if core.processor_id == 0 {
                    boot_package = Some(package);
                }
                packages.entry(package).or_default().push(core);
            }
            None => order.push(core),
        }
    }

    if let Some(cores) = boot_package.and_then(|package| packages.remove(&package)) {
        order.extend(cores);
    }
    order.extend(packages.into_values().flatten());
    order
}

/// C header embedding the order for native benchmarks
pub fn render_header(order: &[CoreDescriptor]) -> String {
    let ids: Vec<String> = order.iter().map(|c| c.processor_id.to_string()).collect();

    format!(
        "int online_cpus = {};\nint cpuseq[] = {{ {} }};\n",
        order.len(),
        ids.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn core(processor_id: CoreId, physical_id: Option<u32>) -> CoreDescriptor {
        CoreDescriptor {
            processor_id,
            physical_id,
            siblings: BTreeSet::from([processor_id]),
        }
    }

    fn ids(order: &[CoreDescriptor]) -> Vec<CoreId> {
        order.iter().map(|c| c.processor_id).collect()
    }

    fn write_cpuinfo(dir: &Path, cpus: &[(CoreId, Option<u32>)]) -> PathBuf {
        let mut text = String::new();
        for (processor, physical) in cpus {
            text.push_str(&format!("processor\t: {}\n", processor));
            text.push_str("vendor_id\t: GenuineIntel\n");
            if let Some(physical) = physical {
                text.push_str(&format!("physical id\t: {}\n", physical));
            }
            text.push_str("flags\t\t: fpu tsc rdtscp\n\n");
        }
        let path = dir.join("cpuinfo");
        fs::write(&path, text).unwrap();
        path
    }

    fn write_siblings(root: &Path, processor: CoreId, list: &str) {
        let dir = root.join(format!("cpu{}", processor)).join("topology");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("thread_siblings_list"), format!("{}\n", list)).unwrap();
    }

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0,4\n").unwrap(), BTreeSet::from([0, 4]));
        assert_eq!(parse_cpu_list("2-3").unwrap(), BTreeSet::from([2, 3]));
        assert_eq!(
            parse_cpu_list("0-1,8-9").unwrap(),
            BTreeSet::from([0, 1, 8, 9])
        );
        assert!(parse_cpu_list("").is_err());
        assert!(parse_cpu_list("3-1").is_err());
        assert!(parse_cpu_list("a,b").is_err());
    }

    #[test]
    fn test_parse_cpuinfo_skips_header_blocks() {
        let text = "Processor\t: ARMv7\n\nprocessor\t: 0\nphysical id\t: 1\n\nprocessor\t: 1\n";
        let records = parse_cpuinfo(text).unwrap();
        assert_eq!(
            records,
            vec![
                ProcessorRecord {
                    processor_id: 0,
                    physical_id: Some(1)
                },
                ProcessorRecord {
                    processor_id: 1,
                    physical_id: None
                },
            ]
        );
        assert!(matches!(
            parse_cpuinfo("\n\n"),
            Err(CalibrationError::TopologyUnavailable { .. })
        ));
    }

    #[test]
    fn test_boot_package_first() {
        let order = canonical_order(vec![
            core(4, Some(1)),
            core(5, Some(1)),
            core(0, Some(2)),
            core(1, Some(2)),
            core(8, Some(0)),
        ]);
        assert_eq!(ids(&order), vec![0, 1, 8, 4, 5]);
    }

    #[test]
    fn test_ungrouped_cores_come_first() {
        let order = canonical_order(vec![
            core(0, Some(0)),
            core(7, None),
            core(1, Some(0)),
            core(3, None),
        ]);
        assert_eq!(ids(&order), vec![7, 3, 0, 1]);
    }

    #[test]
    fn test_no_boot_package_falls_back_to_ascending() {
        let order = canonical_order(vec![core(0, None), core(6, Some(3)), core(2, Some(1))]);
        assert_eq!(ids(&order), vec![0, 2, 6]);
    }

    #[test]
    fn test_discover_keeps_one_primary_per_core() {
        let dir = tempfile::tempdir().unwrap();
        // Two packages, two cores each, two threads per core; cpu 0 on package 1
        let cpuinfo = write_cpuinfo(
            dir.path(),
            &[
                (0, Some(1)),
                (1, Some(1)),
                (2, Some(0)),
                (3, Some(0)),
                (4, Some(1)),
                (5, Some(1)),
                (6, Some(0)),
                (7, Some(0)),
            ],
        );
        let root = dir.path().join("cpu");
        for (cpu, list) in [
            (0, "0,4"),
            (1, "1,5"),
            (2, "2,6"),
            (3, "3,7"),
            (4, "0,4"),
            (5, "1,5"),
            (6, "2,6"),
            (7, "3,7"),
        ] {
            write_siblings(&root, cpu, list);
        }

        let order = Sequencer::new(SysfsTopology::new(cpuinfo, root))
            .discover()
            .unwrap();

        assert_eq!(ids(&order), vec![0, 1, 2, 3]);
        assert_eq!(order[0].physical_id, Some(1));
        assert_eq!(order[0].siblings, BTreeSet::from([0, 4]));
    }

    #[test]
    fn test_missing_sibling_files_mean_no_hyperthreading() {
        let dir = tempfile::tempdir().unwrap();
        let cpuinfo = write_cpuinfo(dir.path(), &[(0, Some(0)), (1, Some(0)), (2, Some(0))]);

        let order = Sequencer::new(SysfsTopology::new(cpuinfo, dir.path().join("absent")))
            .discover()
            .unwrap();

        assert_eq!(ids(&order), vec![0, 1, 2]);
        assert!(order.iter().all(|c| c.siblings.len() == 1));
    }

    #[test]
    fn test_unreadable_cpuinfo_is_topology_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = SysfsTopology::new(dir.path().join("nope"), dir.path());
        assert!(matches!(
            Sequencer::new(source).discover(),
            Err(CalibrationError::TopologyUnavailable { .. })
        ));
    }

    #[test]
    fn test_render_header() {
        let header = render_header(&[core(0, Some(0)), core(2, Some(0)), core(8, Some(1))]);
        assert_eq!(
            header,
            "int online_cpus = 3;\nint cpuseq[] = { 0, 2, 8 };\n"
        );
    }
}
