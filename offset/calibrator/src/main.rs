//! Clock-offset calibration CLI
//!
//! Orders the cores, drives the round-trip probe over every pair, and
//! inspects the collected samples offline.
//!
//! ## Usage
//!
//! ```bash
//! # Print the canonical core order, or a C header embedding it
//! ./ordo-calibrate sequence --header > cpuseq.h
//!
//! # Run the all-pairs campaign and write a JSON report
//! sudo ./ordo-calibrate calibrate --probe ./ordo-probe --report calibration.json
//!
//! # Continue an interrupted campaign
//! sudo ./ordo-calibrate calibrate --resume
//!
//! # Run the probe through a wrapper; leading arguments go before the core ids
//! sudo ./ordo-calibrate calibrate --probe taskset --probe-arg 0x1 --probe-arg ./ordo-probe
//!
//! # Offset matrix of 16 cores from the stored samples
//! ./ordo-calibrate render output 16
//!
//! # Ratio histogram of a round-trip log
//! ./ordo-calibrate analyze exchanges.log freq_table.txt
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use ordo_calibrator::{
    analyzer::{self, AnalysisResult},
    driver::ProbeDriver,
    exporter::{self, ExporterType, ReportExporter},
    probe::CommandProbe,
    stats,
    store::{self, FsStore},
    topology::{self, Sequencer, SysfsTopology},
    CalibrationError,
};
use ordo_common::{DEFAULT_ITERATIONS, DEFAULT_PROBE_PROGRAM, DEFAULT_STORE_DIR};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

/// Cross-core clock-offset calibration
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging
    #[clap(short, long, global = true)]
    verbose: bool,

    /// cpuinfo file used for topology discovery
    #[clap(long, global = true, default_value = topology::DEFAULT_CPUINFO)]
    cpuinfo: PathBuf,

    /// sysfs cpu directory used for hyperthread siblings
    #[clap(long, global = true, default_value = topology::DEFAULT_CPU_ROOT)]
    sysfs: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the canonical core visiting order
    Sequence {
        /// Emit a C header (`online_cpus`, `cpuseq[]`)
        #[clap(long)]
        header: bool,
    },

    /// Probe every core pair and report the global maximum offset
    Calibrate {
        /// Round-trip probe executable
        #[clap(short, long, default_value = DEFAULT_PROBE_PROGRAM)]
        probe: PathBuf,

        /// Extra argument passed to the probe before the core ids (repeatable)
        #[clap(long = "probe-arg", allow_hyphen_values = true)]
        probe_args: Vec<String>,

        /// Round trips per probe direction
        #[clap(short, long, default_value_t = DEFAULT_ITERATIONS)]
        iterations: u64,

        /// Raw sample store directory
        #[clap(short, long, default_value = DEFAULT_STORE_DIR)]
        output: PathBuf,

        /// Write a JSON calibration report here
        #[clap(long)]
        report: Option<PathBuf>,

        /// Reuse pairs whose two directions are already stored
        #[clap(long)]
        resume: bool,
    },

    /// Render the stored pair minima as a core × core matrix
    Render {
        /// Raw sample store directory
        store_dir: PathBuf,

        /// Number of cores (ids 0..count)
        core_count: usize,

        /// Output format (text, json)
        #[clap(short, long, default_value = "text")]
        format: String,
    },

    /// Analyze a round-trip log and write its ratio histogram
    Analyze {
        /// Log of exchanges, six integers per line
        log_file: PathBuf,

        /// Output file for the `value, count` histogram
        out_file: PathBuf,
    },

    /// Print min, max and median of a scalar sample file
    Summary {
        /// One integer per line
        file: PathBuf,
    },

    /// Write the `value, count` frequency table of a scalar sample file
    Freq {
        /// One integer per line
        file: PathBuf,

        /// Output file
        out_file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            // Usage errors go to stdout with a failing status
            println!("{}", e);
            std::process::exit(2);
        }
        Err(e) => e.exit(),
    };

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let source = SysfsTopology::new(cli.cpuinfo, cli.sysfs);

    match cli.command {
        Command::Sequence { header } => sequence(source, header),
        Command::Calibrate {
            probe,
            probe_args,
            iterations,
            output,
            report,
            resume,
        } => calibrate(
            source,
            CommandProbe::new(probe).with_args(probe_args),
            iterations,
            output,
            report,
            resume,
        ),
        Command::Render {
            store_dir,
            core_count,
            format,
        } => render(store_dir, core_count, &format),
        Command::Analyze { log_file, out_file } => analyze(log_file, out_file),
        Command::Summary { file } => summary(file),
        Command::Freq { file, out_file } => freq(file, out_file),
    }
}

fn sequence(source: SysfsTopology, header: bool) -> Result<()> {
    let order = Sequencer::new(source).discover()?;

    if header {
        print!("{}", topology::render_header(&order));
    } else {
        let ids: Vec<String> = order.iter().map(|c| c.processor_id.to_string()).collect();
        println!("{}", ids.join(" "));
    }
    Ok(())
}

fn calibrate(
    source: SysfsTopology,
    probe: CommandProbe,
    iterations: u64,
    output: PathBuf,
    report: Option<PathBuf>,
    resume: bool,
) -> Result<()> {
    info!("Starting clock-offset calibration...");
    info!("   Probe: {:?}", probe);
    info!("   Iterations: {}", iterations);
    info!("   Store: {:?}", output);
    info!("   Resume: {}", resume);

    let order = Sequencer::new(source)
        .discover()
        .context("Cannot determine the core visiting order")?;

    let store = FsStore::create(&output)?;
    let mut driver = ProbeDriver::new(probe, store).with_resume(resume);

    let outcome = match driver.calibrate_all(&order, iterations) {
        Ok(outcome) => outcome,
        Err(e @ CalibrationError::ProbeExecutionFailed { .. }) => {
            return Err(e).context(
                "Calibration aborted; stored pairs are kept, re-run with --resume to continue",
            );
        }
        Err(e) => return Err(e.into()),
    };

    if outcome.resumed > 0 {
        info!("Reused {} stored pairs", outcome.resumed);
    }

    if let Some(path) = report {
        ReportExporter::new(path.clone(), true).export(&outcome.to_report(iterations))?;
        info!("Report written to {:?}", path);
    }

    match outcome.global_max {
        Some(max) => println!("{}", max),
        None => warn!("No core pairs on this machine; no offset bound produced"),
    }
    Ok(())
}

fn render(store_dir: PathBuf, core_count: usize, format: &str) -> Result<()> {
    let format = match format.to_lowercase().as_str() {
        "text" | "txt" => ExporterType::Text,
        "json" => ExporterType::Json,
        _ => anyhow::bail!("Unsupported format: {}. Use text or json", format),
    };

    let store = FsStore::open(&store_dir);
    let matrix = exporter::render(&store, core_count)
        .with_context(|| format!("Cannot render offset table from {:?}", store_dir))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    format.exporter().export(&matrix, &mut out)?;
    out.flush()?;
    Ok(())
}

fn analyze(log_file: PathBuf, out_file: PathBuf) -> Result<()> {
    let samples = analyzer::read_log(&log_file)?;
    let result = analyzer::analyze(&samples);

    let mut out = BufWriter::new(
        File::create(&out_file)
            .with_context(|| format!("Failed to create output file: {:?}", out_file))?,
    );
    exporter::write_frequency_table(&result.ratio_histogram, &mut out)?;
    out.flush()
        .with_context(|| format!("Failed to write to output file: {:?}", out_file))?;

    print_analysis(&result);
    Ok(())
}

fn summary(file: PathBuf) -> Result<()> {
    let samples = store::read_samples(&file)?;
    let summary = stats::summarize(&samples).with_context(|| format!("{:?}", file))?;
    println!(
        "min: {} max: {} median: {}",
        summary.min, summary.max, summary.median
    );
    Ok(())
}

fn freq(file: PathBuf, out_file: PathBuf) -> Result<()> {
    let samples = store::read_samples(&file)?;
    let table = stats::frequency_table(&samples).with_context(|| format!("{:?}", file))?;

    let mut out = BufWriter::new(
        File::create(&out_file)
            .with_context(|| format!("Failed to create output file: {:?}", out_file))?,
    );
    exporter::write_frequency_table(&table, &mut out)?;
    out.flush()
        .with_context(|| format!("Failed to write to output file: {:?}", out_file))?;
    Ok(())
}

fn print_analysis(result: &AnalysisResult) {
    let show = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.1}", v));

    info!("");
    info!("============================================");
    info!("             Offset Analysis");
    info!("============================================");
    info!("");
    info!("  Exchanges:  {:>10}", result.total);
    info!("  Accepted:   {:>10}", result.accepted);
    info!("  Anomalies:  {:>10}", result.anomalies.len());
    info!("");
    info!("  Offset min: {:>10}", show(result.offset_min));
    info!("  Offset max: {:>10}", show(result.offset_max));
    info!(
        "  Min RTT:    {:>10}",
        result
            .min_rtt
            .map_or_else(|| "n/a".to_string(), |v| v.to_string())
    );
    info!("");
    info!("============================================");

    for anomaly in &result.anomalies {
        warn!(
            "exchange {}: {:?} (outbound {}, return {})",
            anomaly.index, anomaly.kind, anomaly.outbound, anomaly.return_leg
        );
    }
}
