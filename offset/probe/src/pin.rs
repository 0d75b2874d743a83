//! Thread placement helpers
//!
//! Both probe threads must run on their named core for the whole exchange,
//! otherwise the recorded counters belong to whichever core the scheduler
//! picked.

use anyhow::{anyhow, bail, Result};
use log::warn;
use ordo_common::CoreId;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Barrier,
};

/// Pin, optionally raise priority, then wait for the peer thread
///
/// A pinning failure on either side aborts both threads after the
/// barrier, so neither spins forever on a peer that never arrives.
pub fn prepare(core: CoreId, realtime: bool, ready: &Barrier, failed: &AtomicBool) -> Result<()> {
    let pinned = pin_current_thread(core);
    if pinned.is_err() {
        failed.store(true, Ordering::Release);
    } else if realtime {
        raise_to_fifo();
    }

    ready.wait();

    pinned?;
    if failed.load(Ordering::Acquire) {
        return Err(anyhow!("peer thread could not be pinned"));
    }
    Ok(())
}

/// Bind the calling thread to a single logical processor
#[cfg(target_os = "linux")]
pub fn pin_current_thread(core: CoreId) -> Result<()> {
    let core = core as usize;
    if core >= libc::CPU_SETSIZE as usize {
        bail!("core {} exceeds CPU_SETSIZE", core);
    }

    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);

        // pid 0 targets the calling thread
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            bail!(
                "cannot bind thread to core {}: {}",
                core,
                std::io::Error::last_os_error()
            );
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(core: CoreId) -> Result<()> {
    bail!("pinning to core {} is only supported on Linux", core)
}

/// Move the calling thread to `SCHED_FIFO` priority 1
///
/// Needs `CAP_SYS_NICE`; without it the probe still runs, with more
/// preemption noise in the samples.
#[cfg(target_os = "linux")]
pub fn raise_to_fifo() {
    unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = 1;
        if libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) != 0 {
            warn!(
                "cannot switch to SCHED_FIFO: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn raise_to_fifo() {
    warn!("SCHED_FIFO is only supported on Linux");
}
