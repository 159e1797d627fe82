// crates/serialite/src/error.rs
// ============================================================================
// Module: Bridge Errors
// Description: Error taxonomy for dispatch and reply outcomes.
// Purpose: Keep synchronous dispatch failures apart from async reply errors.
// Dependencies: rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Two error families exist. [`DispatchError`] is returned synchronously by
//! dispatch calls when a command cannot be accepted. [`BridgeError`] travels
//! inside a [`crate::Reply`] and describes why an accepted command failed on
//! the worker. Worker-side failures never terminate the worker loop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::ffi;
use thiserror::Error;

// ============================================================================
// SECTION: Engine Errors
// ============================================================================

/// Native engine failure: extended result code plus the engine's message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("sqlite error {code}: {message}")]
pub struct EngineError {
    /// Extended `SQLite` result code.
    pub code: i32,
    /// Message reported by the engine.
    pub message: String,
}

impl EngineError {
    /// Creates an engine error.
    pub(crate) fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns the primary result code (low byte of the extended code).
    #[must_use]
    pub const fn primary_code(&self) -> i32 {
        self.code & 0xff
    }

    /// Returns true when the engine reported `SQLITE_BUSY` contention.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.primary_code() == ffi::SQLITE_BUSY
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(native, message) => Self {
                code: native.extended_code,
                message: message.unwrap_or_else(|| native.to_string()),
            },
            other => Self::new(ffi::SQLITE_ERROR, other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Reply Errors
// ============================================================================

/// Failure carried by a reply for an accepted command.
///
/// # Invariants
/// - Produced only on the worker thread; never terminates the worker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Caller supplied an unusable argument (bad filename, empty statement).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Bound value count differs from the statement's parameter count.
    #[error("argument count mismatch: expected {expected}, got {actual}")]
    ArgCountMismatch {
        /// Declared parameter count.
        expected: usize,
        /// Supplied value count.
        actual: usize,
    },
    /// A value cannot be bound unambiguously.
    #[error("wrong type at parameter {index}: {reason}")]
    WrongType {
        /// 1-based parameter index.
        index: usize,
        /// Why the value was rejected.
        reason: String,
    },
    /// Allocation failed while building the reply.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Engine-level failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Step produced an outcome other than row, done, or busy.
    #[error("unexpected step result: {code}")]
    UnexpectedResult {
        /// Raw engine result code.
        code: i32,
    },
    /// Command executed while no engine handle is open.
    #[error("database not open")]
    NotOpen,
    /// Open executed while an engine handle is already open.
    #[error("database already open")]
    AlreadyOpen,
    /// Statement is not held by the worker in the current session.
    #[error("no prepared statement")]
    NoStatement,
}

// ============================================================================
// SECTION: Dispatch Errors
// ============================================================================

/// Synchronous failure to accept a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The connection is torn down (or tearing down); the push was rejected.
    #[error("connection closed: command rejected")]
    Closed,
    /// The worker thread could not be created.
    #[error("failed to spawn connection worker: {0}")]
    Spawn(String),
    /// The command was dropped before a reply was sent.
    #[error("command dropped without a reply")]
    Unanswered,
}
