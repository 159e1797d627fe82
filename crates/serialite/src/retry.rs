// crates/serialite/src/retry.rs
// ============================================================================
// Module: Busy Retry
// Description: Bounded linear backoff for engine contention.
// Purpose: Retry statement compilation while another connection holds a lock.
// Dependencies: serialite-config, tracing
// ============================================================================

//! ## Overview
//! Compilation is retried only on `SQLITE_BUSY`. The worker sleeps
//! `n * backoff_step_us` microseconds before retry `n`, so the total wait is
//! bounded and the worker never spins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::thread;

use serialite_config::PrepareRetryConfig;
use tracing::debug;
use tracing::trace;

use crate::error::EngineError;

// ============================================================================
// SECTION: Retry
// ============================================================================

/// Runs `attempt` until it stops reporting busy or the retry budget is spent.
///
/// Runs at most `max_retries + 1` attempts and returns the last outcome.
pub(crate) fn retry_on_busy<T>(
    policy: PrepareRetryConfig,
    mut attempt: impl FnMut() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut retries = 0_u32;
    loop {
        match attempt() {
            Err(err) if err.is_busy() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay_before(retries);
                trace!(retry = retries, delay_us = delay.as_micros(), "engine busy; backing off");
                thread::sleep(delay);
            }
            Err(err) if err.is_busy() => {
                debug!(retries, error = %err, "engine still busy; retry budget spent");
                return Err(err);
            }
            outcome => return outcome,
        }
    }
}
