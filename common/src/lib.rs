//! Shared types and constants for the ordo clock-offset tooling
//!
//! This crate provides the record types, constants, and naming rules
//! shared between the round-trip probe executable and the calibrator.

#![cfg_attr(not(test), no_std)]

pub mod constants;
pub mod types;

// Re-export commonly used types
pub use constants::*;
pub use types::{CoreId, PairKey, ParseSampleError, RawSample};
