// crates/serialite/src/telemetry.rs
// ============================================================================
// Module: Telemetry
// Description: Tracing subscriber setup and per-connection counters.
// Purpose: Make worker activity observable without touching the hot path.
// Dependencies: tracing-subscriber, thiserror
// ============================================================================

//! ## Overview
//! Library code only emits `tracing` events; installing a subscriber is the
//! embedding process's choice. [`init_tracing`] installs the standard `fmt`
//! subscriber with an `EnvFilter`, preferring `RUST_LOG` over the configured
//! filter.
//!
//! [`ConnectionStats`] is a point-in-time snapshot of relaxed atomic counters
//! updated by dispatchers and the worker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serialite_config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Subscriber
// ============================================================================

/// Failure to install the tracing subscriber.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// A global subscriber is already installed.
    #[error("tracing subscriber already installed: {0}")]
    Install(String),
}

/// Installs a global `fmt` subscriber using `RUST_LOG` or `config.filter`.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or a subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|err| TelemetryError::Filter(err.to_string()))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_thread_names(true)
        .try_init()
        .map_err(|err| TelemetryError::Install(err.to_string()))
}

// ============================================================================
// SECTION: Connection Counters
// ============================================================================

/// Snapshot of one connection's activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Commands accepted onto the queue.
    pub commands_accepted: u64,
    /// Dispatches rejected because the connection was torn down.
    pub commands_rejected: u64,
    /// Commands the worker has finished executing, internal ones included.
    pub commands_executed: u64,
    /// Replies dropped because the caller's endpoint was gone.
    pub replies_undeliverable: u64,
    /// Statements compiled over the connection's lifetime.
    pub statements_prepared: u64,
    /// Statements released by the worker.
    pub statements_finalized: u64,
    /// Commands currently waiting in the queue.
    pub queue_depth: usize,
}

impl ConnectionStats {
    /// Returns statements compiled but not yet released.
    #[must_use]
    pub const fn statements_live(&self) -> u64 {
        self.statements_prepared.saturating_sub(self.statements_finalized)
    }
}

/// Live counters shared between dispatchers and the worker.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    /// See [`ConnectionStats::commands_accepted`].
    accepted: AtomicU64,
    /// See [`ConnectionStats::commands_rejected`].
    rejected: AtomicU64,
    /// See [`ConnectionStats::commands_executed`].
    executed: AtomicU64,
    /// See [`ConnectionStats::replies_undeliverable`].
    undeliverable: AtomicU64,
    /// See [`ConnectionStats::statements_prepared`].
    prepared: AtomicU64,
    /// See [`ConnectionStats::statements_finalized`].
    finalized: AtomicU64,
}

impl StatsCounters {
    /// Records an accepted push.
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rejected push.
    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a command the worker finished.
    pub(crate) fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reply whose endpoint was gone.
    pub(crate) fn record_undeliverable(&self) {
        self.undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a compiled statement.
    pub(crate) fn record_prepared(&self) {
        self.prepared.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `count` released statements.
    pub(crate) fn record_finalized(&self, count: u64) {
        self.finalized.fetch_add(count, Ordering::Relaxed);
    }

    /// Captures the counters alongside the current queue depth.
    pub(crate) fn snapshot(&self, queue_depth: usize) -> ConnectionStats {
        ConnectionStats {
            commands_accepted: self.accepted.load(Ordering::Relaxed),
            commands_rejected: self.rejected.load(Ordering::Relaxed),
            commands_executed: self.executed.load(Ordering::Relaxed),
            replies_undeliverable: self.undeliverable.load(Ordering::Relaxed),
            statements_prepared: self.prepared.load(Ordering::Relaxed),
            statements_finalized: self.finalized.load(Ordering::Relaxed),
            queue_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use serialite_config::LoggingConfig;

    use super::StatsCounters;
    use super::TelemetryError;
    use super::init_tracing;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let counters = StatsCounters::default();
        counters.record_accepted();
        counters.record_accepted();
        counters.record_rejected();
        counters.record_prepared();
        counters.record_prepared();
        counters.record_finalized(1);
        let stats = counters.snapshot(3);
        assert_eq!(stats.commands_accepted, 2);
        assert_eq!(stats.commands_rejected, 1);
        assert_eq!(stats.statements_live(), 1);
        assert_eq!(stats.queue_depth, 3);
    }

    #[test]
    fn second_install_is_reported() {
        let config = LoggingConfig::default();
        let first = init_tracing(&config);
        let second = init_tracing(&config);
        assert!(first.is_ok() || matches!(first, Err(TelemetryError::Install(_))));
        assert!(matches!(second, Err(TelemetryError::Install(_))));
    }
}
