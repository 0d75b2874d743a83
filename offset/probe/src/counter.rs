//! Serialized reads of the per-core timestamp counter
//!
//! - x86_64: `rdtscp`, which waits for prior instructions to retire
//! - aarch64: `isb; mrs cntvct_el0`
//!
//! Other targets have no per-core counter worth calibrating.

use std::sync::atomic::{compiler_fence, Ordering};

/// Whether this target has a counter the probe can read
pub const SUPPORTED: bool = cfg!(any(target_arch = "x86_64", target_arch = "aarch64"));

/// Read the local core's timestamp counter
#[inline(always)]
pub fn read_counter() -> u64 {
    compiler_fence(Ordering::SeqCst);
    let value = read_counter_raw();
    compiler_fence(Ordering::SeqCst);
    value
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn read_counter_raw() -> u64 {
    let cycles: u64;
    unsafe {
        std::arch::asm!(
            "rdtscp",
            "shl rdx, 32",
            "or rax, rdx",
            out("rax") cycles,
            out("rdx") _,
            out("rcx") _,
            options(nostack, nomem),
        );
    }
    cycles
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
fn read_counter_raw() -> u64 {
    let cycles: u64;
    unsafe {
        std::arch::asm!(
            "isb",
            "mrs {}, cntvct_el0",
            out(reg) cycles,
            options(nostack, nomem),
        );
    }
    cycles
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
fn read_counter_raw() -> u64 {
    0
}
