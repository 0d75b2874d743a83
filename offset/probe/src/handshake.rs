//! Cache-line ping-pong between a requester and a responder core
//!
//! The requester overwrites the shared phase word with its own counter
//! reading. The responder spins on the word, reads its counter as soon as
//! the value changes, and records `responder - requester`. The minimum of
//! these differences over many rounds bounds the clock offset between the
//! two cores from above, because every round adds a non-negative transfer
//! latency on top of the true offset.

use crate::{counter::read_counter, pin};
use anyhow::{anyhow, Result};
use log::debug;
use ordo_common::{CoreId, PHASE_END, PHASE_INIT, PHASE_RECV, PHASE_RESET};
use std::{
    hint,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Barrier,
    },
    thread,
};

/// Phase word aligned to two 64-byte cache lines, so neither its own line
/// nor the adjacent line fetched with it by the spatial prefetcher is shared
#[repr(C, align(128))]
struct SyncState {
    phase: AtomicU64,
}

/// Probe run parameters
#[derive(Debug, Clone, Copy)]
pub struct Handshake {
    pub requester: CoreId,
    pub responder: CoreId,
    pub iterations: usize,
    pub realtime: bool,
}

impl Handshake {
    /// Run all rounds and return one `responder - requester` sample per round
    pub fn run(&self) -> Result<Vec<i64>> {
        if self.requester == self.responder {
            return Err(anyhow!(
                "requester and responder must be different cores (got {} twice)",
                self.requester
            ));
        }

        let state = SyncState {
            phase: AtomicU64::new(0),
        };
        let ready = Barrier::new(2);
        let failed = AtomicBool::new(false);

        thread::scope(|scope| {
            let responder = scope.spawn(|| {
                pin::prepare(self.responder, self.realtime, &ready, &failed)?;
                Ok::<_, anyhow::Error>(responder_rounds(&state))
            });

            let requester = pin::prepare(self.requester, self.realtime, &ready, &failed);
            if requester.is_ok() {
                requester_rounds(&state, self.iterations.max(1));
            }

            let samples = responder
                .join()
                .map_err(|_| anyhow!("responder thread panicked"))??;
            requester?;
            debug!(
                "collected {} rounds between cores {} and {}",
                samples.len(),
                self.requester,
                self.responder
            );
            Ok(samples)
        })
    }
}

fn responder_rounds(state: &SyncState) -> Vec<i64> {
    let mut samples = Vec::new();

    loop {
        state.phase.store(PHASE_INIT, Ordering::Release);

        let requester_ts = loop {
            let phase = state.phase.load(Ordering::Acquire);
            if phase != PHASE_INIT {
                break phase;
            }
            hint::spin_loop();
        };
        let responder_ts = read_counter();

        samples.push(responder_ts as i64 - requester_ts as i64);
        state.phase.store(PHASE_RECV, Ordering::Release);

        while state.phase.load(Ordering::Acquire) == PHASE_RECV {
            hint::spin_loop();
        }
        if state.phase.load(Ordering::Acquire) != PHASE_RESET {
            break;
        }
    }

    samples
}

fn requester_rounds(state: &SyncState, iterations: usize) {
    for round in 0..iterations {
        while state.phase.load(Ordering::Acquire) != PHASE_INIT {
            hint::spin_loop();
        }

        state.phase.swap(read_counter(), Ordering::AcqRel);

        while state.phase.load(Ordering::Acquire) != PHASE_RECV {
            hint::spin_loop();
        }
        if round + 1 != iterations {
            state.phase.store(PHASE_RESET, Ordering::Release);
        }
    }
    state.phase.store(PHASE_END, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_core_is_rejected() {
        let handshake = Handshake {
            requester: 2,
            responder: 2,
            iterations: 10,
            realtime: false,
        };
        assert!(handshake.run().is_err());
    }

    #[test]
    fn test_rounds_without_pinning_produce_one_sample_each() {
        let state = SyncState {
            phase: AtomicU64::new(0),
        };

        let samples = thread::scope(|scope| {
            let responder = scope.spawn(|| responder_rounds(&state));
            requester_rounds(&state, 25);
            responder.join().unwrap()
        });

        assert_eq!(samples.len(), 25);
    }
}
