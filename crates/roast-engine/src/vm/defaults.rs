//! Default constants for VM configuration.
//!
//! Centralizes the numbers shared by `VmOptions`, the OSR policy and the
//! quick-node table.

/// Default maximum interpreter activations on one thread before stack overflow.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Saturation bound of a per-activation loop counter.
pub const DEFAULT_LOOP_COUNT_LIMIT: u32 = u32::MAX >> 1;

/// Consult the tiering policy every N back-edges.
pub const DEFAULT_OSR_POLL_INTERVAL: u32 = 1;

/// Loop iterations (accumulated plus live) before `ThresholdPolicy` requests OSR.
pub const DEFAULT_OSR_LOOP_THRESHOLD: u64 = 10_000;

/// Quick-node arena capacity, bounded by the 2-byte operand after the `QUICK` tag.
pub const MAX_QUICK_NODES: usize = u16::MAX as usize;
