//! Shared constants for the probe and the calibrator
//!
//! Both sides of the probe interface must agree on these values.

// ============================================================================
// Acceptance Band
// ============================================================================

/// Lowest outbound/return symmetry ratio (percent) accepted as a clean exchange
pub const RATIO_ACCEPT_MIN: i64 = 97;

/// Highest outbound/return symmetry ratio (percent) accepted as a clean exchange
pub const RATIO_ACCEPT_MAX: i64 = 103;

// ============================================================================
// Campaign Defaults
// ============================================================================

/// Round trips per probe invocation
pub const DEFAULT_ITERATIONS: u64 = 1_000_000;

/// Default name of the probe executable
pub const DEFAULT_PROBE_PROGRAM: &str = "ordo-probe";

/// Default directory of the raw sample store
pub const DEFAULT_STORE_DIR: &str = "output";

/// Extension of raw sample files (`<from>-<to>.txt`)
pub const SAMPLE_FILE_EXTENSION: &str = "txt";

// ============================================================================
// Probe Handshake Phases
// ============================================================================
//
// The requester overwrites the phase word with its timestamp counter, so
// phase values must stay far below any realistic counter reading.

/// Responder is armed and waiting for the requester's timestamp
pub const PHASE_INIT: u64 = 1;

/// Responder has recorded the exchange
pub const PHASE_RECV: u64 = 3;

/// Requester asks for another round
pub const PHASE_RESET: u64 = 4;

/// Requester is done; responder exits
pub const PHASE_END: u64 = 5;
