//! Process-wide memory budget and per-sweep partitioning.
//!
//! The budget is set once at `init` and read by every sweep when sizing its
//! auxiliary structures: what remains after the input and output stream
//! buffers is split across the priority queues proportionally to their
//! `DATA_STRUCTURES` weights.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use strata_core::{Error, Result};

/// Default budget when the engine is used without an explicit `init`.
const DEFAULT_LIMIT: u64 = 512 * 1024 * 1024;

/// Nominal footprint of one open stream buffer.
pub const STREAM_MEMORY: u64 = 64 * 1024;

/// Floor under the auxiliary budget so tiny limits still run.
const MIN_AUX: u64 = 64 * 1024;

static LIMIT: AtomicU64 = AtomicU64::new(DEFAULT_LIMIT);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Sets the engine's memory budget. A zero budget is caller misuse.
pub fn init(bytes: u64) -> Result<()> {
    if bytes == 0 {
        return Err(Error::invalid_argument("memory budget must be positive"));
    }
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(Error::invalid_argument("engine already initialized"));
    }
    LIMIT.store(bytes, Ordering::SeqCst);
    tracing::debug!(bytes, "memory budget set");
    Ok(())
}

/// Releases the engine. Scratch files die with their handles.
pub fn deinit() {
    INITIALIZED.store(false, Ordering::SeqCst);
    LIMIT.store(DEFAULT_LIMIT, Ordering::SeqCst);
}

/// The configured budget.
pub fn available() -> u64 {
    LIMIT.load(Ordering::SeqCst)
}

/// Budget left for auxiliary structures after `streams` open stream buffers.
pub fn aux_available(streams: u64) -> u64 {
    available().saturating_sub(streams * STREAM_MEMORY).max(MIN_AUX)
}

/// Splits `total` across two structures proportionally to their weights.
pub fn split_weighted(total: u64, weight_a: u64, weight_b: u64) -> (u64, u64) {
    let a = (total / (weight_a + weight_b)) * weight_a;
    (a, total - a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_is_invalid() {
        assert!(matches!(init(0), Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn split_is_proportional_and_exhaustive() {
        let (a, b) = split_weighted(300, 2, 1);
        assert_eq!(a, 200);
        assert_eq!(b, 100);
        assert_eq!(a + b, 300);
    }

    #[test]
    fn aux_subtracts_stream_buffers() {
        let total = available();
        assert_eq!(aux_available(2), total - 2 * STREAM_MEMORY);
    }
}
