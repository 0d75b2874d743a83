//! Cache-line transfer latency between two cores
//!
//! Each round the responder flips a shared word from 0 to 1, pulling the
//! line into its cache in modified state. The requester then times its own
//! compare-and-swap back to 0, which has to fetch the line from the
//! responder's cache. Both threads meet on a barrier between the two steps,
//! so every sample covers exactly one line migration.

use crate::{counter::read_counter, pin};
use anyhow::{anyhow, Result};
use log::debug;
use ordo_common::CoreId;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Barrier,
    },
    thread,
};

/// Shared word on its own pair of 64-byte lines
#[repr(C, align(128))]
struct SharedLine {
    value: AtomicU32,
}

/// Transfer run parameters
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub requester: CoreId,
    pub responder: CoreId,
    pub iterations: usize,
    pub realtime: bool,
}

impl Transfer {
    /// Run all rounds and return the requester's CAS latency per round, in counter ticks
    pub fn run(&self) -> Result<Vec<u64>> {
        if self.requester == self.responder {
            return Err(anyhow!(
                "requester and responder must be different cores (got {} twice)",
                self.requester
            ));
        }

        let line = SharedLine {
            value: AtomicU32::new(0),
        };
        let ready = Barrier::new(2);
        let step = Barrier::new(2);
        let failed = AtomicBool::new(false);
        let rounds = self.iterations.max(1);

        thread::scope(|scope| {
            let responder = scope.spawn(|| {
                pin::prepare(self.responder, self.realtime, &ready, &failed)?;
                responder_rounds(&line, &step, rounds);
                Ok::<_, anyhow::Error>(())
            });

            let requester = pin::prepare(self.requester, self.realtime, &ready, &failed);
            let latencies = match requester {
                Ok(()) => requester_rounds(&line, &step, rounds),
                Err(_) => Vec::new(),
            };

            responder
                .join()
                .map_err(|_| anyhow!("responder thread panicked"))??;
            requester?;
            debug!(
                "timed {} line transfers from core {} to core {}",
                latencies.len(),
                self.responder,
                self.requester
            );
            Ok(latencies)
        })
    }
}

fn responder_rounds(line: &SharedLine, step: &Barrier, rounds: usize) {
    for _ in 0..rounds {
        step.wait();
        let _ = line
            .value
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire);
        step.wait();
    }
}

fn requester_rounds(line: &SharedLine, step: &Barrier, rounds: usize) -> Vec<u64> {
    let mut latencies = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        step.wait();
        step.wait();
        let start = read_counter();
        let _ = line
            .value
            .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire);
        latencies.push(read_counter().wrapping_sub(start));
    }
    latencies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_core_is_rejected() {
        let transfer = Transfer {
            requester: 1,
            responder: 1,
            iterations: 10,
            realtime: false,
        };
        assert!(transfer.run().is_err());
    }

    #[test]
    fn test_rounds_without_pinning_time_every_transfer() {
        let line = SharedLine {
            value: AtomicU32::new(0),
        };
        let step = Barrier::new(2);

        let latencies = thread::scope(|scope| {
            scope.spawn(|| responder_rounds(&line, &step, 40));
            requester_rounds(&line, &step, 40)
        });

        assert_eq!(latencies.len(), 40);
        // every responder flip was undone by the following requester swap
        assert_eq!(line.value.load(Ordering::Acquire), 0);
    }
}
