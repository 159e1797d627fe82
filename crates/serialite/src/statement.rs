// crates/serialite/src/statement.rs
// ============================================================================
// Module: Statement Handle
// Description: Caller-facing handle for one compiled statement.
// Purpose: Address a worker-held statement and release it on last drop.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! A [`Statement`] never touches the engine. It names a statement held by the
//! worker and keeps its [`Connection`] alive. Dropping the last clone queues
//! an unanswered finalize command on the connection, so the statement is
//! released in FIFO order after every command already queued against it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::command::Command;
use crate::command::CorrelationToken;
use crate::command::Payload;
use crate::connection::Connection;
use crate::error::DispatchError;
use crate::reply::ReplyTo;
use crate::value::Value;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Connection-unique identifier of a compiled statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(u64);

impl StatementId {
    /// Wraps a raw identifier.
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt-{}", self.0)
    }
}

// ============================================================================
// SECTION: Statement
// ============================================================================

/// Handle to a compiled statement.
#[derive(Clone)]
pub struct Statement {
    /// Shared statement state.
    inner: Arc<StatementInner>,
}

/// State shared by all clones of one statement handle.
struct StatementInner {
    /// Owning connection, kept alive by this handle.
    connection: Connection,
    /// Worker-side identifier.
    id: StatementId,
    /// Declared positional parameter count.
    parameter_count: usize,
    /// Source text as compiled.
    sql: String,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("connection", &self.inner.connection.id())
            .field("id", &self.inner.id)
            .field("parameter_count", &self.inner.parameter_count)
            .finish_non_exhaustive()
    }
}

impl Statement {
    /// Creates the handle for a statement the worker just registered.
    pub(crate) fn new(
        connection: Connection,
        id: StatementId,
        parameter_count: usize,
        sql: String,
    ) -> Self {
        Self {
            inner: Arc::new(StatementInner {
                connection,
                id,
                parameter_count,
                sql,
            }),
        }
    }

    /// Returns the statement identifier.
    #[must_use]
    pub fn id(&self) -> StatementId {
        self.inner.id
    }

    /// Returns the owning connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Returns the number of positional parameters the statement declares.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.inner.parameter_count
    }

    /// Returns the compiled SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.inner.sql
    }

    /// Queues a reset followed by positional binding of `values`.
    ///
    /// The value count must equal [`Self::parameter_count`]; a mismatch is
    /// reported in the reply and still leaves the statement reset.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] once the connection is torn down.
    pub fn bind(
        &self,
        values: Vec<Value>,
        reply_to: ReplyTo,
    ) -> Result<CorrelationToken, DispatchError> {
        self.inner.connection.dispatch(
            Payload::Bind {
                statement: self.inner.id,
                values,
            },
            reply_to,
        )
    }

    /// Queues one step.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] once the connection is torn down.
    pub fn step(&self, reply_to: ReplyTo) -> Result<CorrelationToken, DispatchError> {
        self.inner.connection.dispatch(
            Payload::Step {
                statement: self.inner.id,
            },
            reply_to,
        )
    }

    /// Queues a read of the result column names; valid before any step.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] once the connection is torn down.
    pub fn column_names(&self, reply_to: ReplyTo) -> Result<CorrelationToken, DispatchError> {
        self.inner.connection.dispatch(
            Payload::ColumnNames {
                statement: self.inner.id,
            },
            reply_to,
        )
    }
}

impl Drop for StatementInner {
    fn drop(&mut self) {
        // Rejection means teardown already finalized it with the session.
        if self.connection.push_internal(Command::finalize(self.id)).is_ok() {
            trace!(connection = %self.connection.id(), statement = %self.id, "finalize queued");
        }
    }
}
