//! Round-trip clock-offset probe
//!
//! Pins a requester thread and a responder thread to two cores, runs the
//! ping-pong handshake for the requested number of rounds, and prints one
//! `responder - requester` counter difference per line.
//!
//! With `--mode transfer` it instead prints the latency, in counter ticks,
//! of pulling one modified cache line from the responder core.
//!
//! ## Usage
//!
//! ```bash
//! # 1M rounds from core 0 to core 8
//! sudo ./ordo-probe 0 8 1000000 > output/0-8.txt
//!
//! # Without SCHED_FIFO (no CAP_SYS_NICE)
//! ./ordo-probe 0 8 100000 --no-fifo
//!
//! # Cache-line transfer latency from core 8 to core 0
//! sudo ./ordo-probe 0 8 100000 --mode transfer
//! ```

mod counter;
mod handshake;
mod pin;
mod transfer;

use anyhow::{bail, Context, Result};
use clap::Parser;
use handshake::Handshake;
use log::info;
use ordo_common::CoreId;
use std::{
    fmt::Display,
    io::{self, BufWriter, Write},
};
use transfer::Transfer;

/// Measure the counter offset between two cores with a cache-line ping-pong
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Requesting core
    requester: CoreId,

    /// Responding core
    responder: CoreId,

    /// Number of rounds (values below 1 run a single round)
    #[clap(allow_hyphen_values = true)]
    iterations: i64,

    /// Measurement: offset (ping-pong clock offset) or transfer (line migration latency)
    #[clap(short, long, default_value = "offset")]
    mode: String,

    /// Do not switch the probe threads to SCHED_FIFO
    #[clap(long)]
    no_fifo: bool,

    /// Verbose logging
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries only samples
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    if !counter::SUPPORTED {
        bail!("no per-core timestamp counter on this architecture");
    }

    let iterations = args.iterations.max(1) as usize;
    let realtime = !args.no_fifo;
    match args.mode.as_str() {
        "offset" => {
            let handshake = Handshake {
                requester: args.requester,
                responder: args.responder,
                iterations,
                realtime,
            };
            info!(
                "Probing {} -> {} for {} rounds",
                handshake.requester, handshake.responder, handshake.iterations
            );
            write_samples(&handshake.run()?)?;
        }
        "transfer" => {
            let transfer = Transfer {
                requester: args.requester,
                responder: args.responder,
                iterations,
                realtime,
            };
            info!(
                "Timing line transfers {} <- {} for {} rounds",
                transfer.requester, transfer.responder, transfer.iterations
            );
            write_samples(&transfer.run()?)?;
        }
        other => bail!("Unknown mode: {} (expected offset or transfer)", other),
    }

    Ok(())
}

fn write_samples<T: Display>(samples: &[T]) -> Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for sample in samples {
        writeln!(out, "{}", sample).context("Failed to write sample")?;
    }
    out.flush().context("Failed to flush samples")?;
    Ok(())
}
