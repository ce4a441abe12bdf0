//! Interpreter tuning constants.

/// Allocations between garbage-collection points. Collection only runs
/// between instructions, never mid-instruction.
pub const GC_ALLOC_INTERVAL: usize = 4096;

/// Maximum call-frame depth before execution is aborted.
pub const MAX_CALL_DEPTH: usize = 64 * 1024;

/// Minimum list capacity after the first growth.
pub const LIST_MIN_CAPACITY: u32 = 4;
