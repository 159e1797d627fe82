// crates/serialite/src/command.rs
// ============================================================================
// Module: Commands
// Description: Queued requests and their correlation tokens.
// Purpose: Describe one operation for the connection worker to execute.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Every dispatch call builds exactly one [`Command`], stamps it with a fresh
//! [`CorrelationToken`] and the caller's [`ReplyTo`], and pushes it onto the
//! connection queue. Internal commands (statement finalize, stop) carry no
//! reply address and are never answered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::reply::ReplyTo;
use crate::statement::StatementId;
use crate::value::Value;

// ============================================================================
// SECTION: Correlation Tokens
// ============================================================================

/// Identifier stamped on a command and echoed on its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationToken(u64);

impl CorrelationToken {
    /// Token carried by internal commands that are never answered.
    pub(crate) const INTERNAL: Self = Self(0);

    /// Returns the raw token value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic token generator shared by every connection of one bridge.
#[derive(Debug)]
pub(crate) struct TokenSource {
    /// Next token value; starts at 1 so 0 stays reserved.
    next: AtomicU64,
}

impl TokenSource {
    /// Creates a generator whose first token is 1.
    pub(crate) const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a fresh token.
    pub(crate) fn next_token(&self) -> CorrelationToken {
        CorrelationToken(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// One queued request.
pub(crate) struct Command {
    /// Token echoed on the reply.
    pub(crate) token: CorrelationToken,
    /// Reply destination; `None` for internal commands.
    pub(crate) reply_to: Option<ReplyTo>,
    /// Requested operation.
    pub(crate) payload: Payload,
}

impl Command {
    /// Builds the stop signal that ends the worker loop.
    pub(crate) const fn stop() -> Self {
        Self {
            token: CorrelationToken::INTERNAL,
            reply_to: None,
            payload: Payload::Stop,
        }
    }

    /// Builds an unanswered finalize request for a compiled statement.
    pub(crate) const fn finalize(statement: StatementId) -> Self {
        Self {
            token: CorrelationToken::INTERNAL,
            reply_to: None,
            payload: Payload::Finalize {
                statement,
            },
        }
    }
}

/// Operation requested by a command.
pub(crate) enum Payload {
    /// Open the engine file at `path`.
    Open {
        /// Engine filename or `:memory:`.
        path: String,
    },
    /// Execute one or more SQL statements without results.
    Exec {
        /// SQL text.
        sql: String,
    },
    /// Compile a statement.
    Prepare {
        /// SQL text; trailing statements are ignored.
        sql: String,
    },
    /// Reset a statement and bind values positionally.
    Bind {
        /// Target statement.
        statement: StatementId,
        /// Values, one per parameter.
        values: Vec<Value>,
    },
    /// Advance a statement by one row.
    Step {
        /// Target statement.
        statement: StatementId,
    },
    /// Read a statement's result column names.
    ColumnNames {
        /// Target statement.
        statement: StatementId,
    },
    /// Release the engine handle.
    Close,
    /// Release a compiled statement (internal, unanswered).
    Finalize {
        /// Statement to release.
        statement: StatementId,
    },
    /// End the worker loop (internal, unanswered).
    Stop,
}

impl Payload {
    /// Returns a stable label for logging.
    pub(crate) const fn label(&self) -> &'static str {
        match self {
            Self::Open {
                ..
            } => "open",
            Self::Exec {
                ..
            } => "exec",
            Self::Prepare {
                ..
            } => "prepare",
            Self::Bind {
                ..
            } => "bind",
            Self::Step {
                ..
            } => "step",
            Self::ColumnNames {
                ..
            } => "column_names",
            Self::Close => "close",
            Self::Finalize {
                ..
            } => "finalize",
            Self::Stop => "stop",
        }
    }
}
