// crates/serialite/src/reply.rs
// ============================================================================
// Module: Replies
// Description: Reply values and the caller-side delivery endpoints.
// Purpose: Carry exactly one typed outcome per accepted command.
// Dependencies: crossbeam-channel
// ============================================================================

//! ## Overview
//! A [`ReplyTo`] is the caller identity recorded on a command: an opaque
//! [`CallerId`] plus the channel the worker sends the [`Reply`] into.
//! Callers pick one of two endpoints:
//! - [`Mailbox`]: a long-lived inbox receiving many replies, correlated by
//!   [`CorrelationToken`].
//! - [`ReplyTo::oneshot`]: a single-fire channel whose [`Pending`] side yields
//!   the one reply for one request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;
use crossbeam_channel::unbounded;

use crate::command::CorrelationToken;
use crate::error::BridgeError;
use crate::error::DispatchError;
use crate::statement::Statement;
use crate::value::Value;

// ============================================================================
// SECTION: Caller Identity
// ============================================================================

/// Next caller identity value.
static NEXT_CALLER: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of the context a reply is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerId(u64);

impl CallerId {
    /// Allocates a fresh caller identity.
    fn fresh() -> Self {
        Self(NEXT_CALLER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identity value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller-{}", self.0)
    }
}

/// Reply destination recorded on a command.
#[derive(Debug, Clone)]
pub struct ReplyTo {
    /// Identity of the receiving context.
    caller: CallerId,
    /// Delivery channel.
    sender: Sender<Reply>,
}

impl ReplyTo {
    /// Creates a single-fire destination and the receiver for its one reply.
    #[must_use]
    pub fn oneshot() -> (Self, Pending) {
        let caller = CallerId::fresh();
        let (sender, receiver) = bounded(1);
        (
            Self {
                caller,
                sender,
            },
            Pending {
                caller,
                receiver,
            },
        )
    }

    /// Returns the caller identity.
    #[must_use]
    pub const fn caller(&self) -> CallerId {
        self.caller
    }

    /// Delivers a reply; hands it back when the receiver is gone or full.
    pub(crate) fn deliver(
        &self,
        token: CorrelationToken,
        outcome: Result<Answer, BridgeError>,
    ) -> Result<(), Reply> {
        let reply = Reply {
            token,
            caller: self.caller,
            outcome,
        };
        self.sender.try_send(reply).map_err(crossbeam_channel::TrySendError::into_inner)
    }
}

// ============================================================================
// SECTION: Replies
// ============================================================================

/// One response to one accepted command.
#[derive(Debug)]
pub struct Reply {
    /// Token of the command being answered.
    pub token: CorrelationToken,
    /// Caller identity the command was stamped with.
    pub caller: CallerId,
    /// Typed outcome.
    pub outcome: Result<Answer, BridgeError>,
}

/// Successful outcome of a command.
#[derive(Debug)]
pub enum Answer {
    /// Open succeeded.
    Opened,
    /// Exec succeeded.
    Executed,
    /// Prepare succeeded; the handle keeps its connection alive.
    Prepared(Statement),
    /// Bind succeeded.
    Bound,
    /// Step result.
    Step(StepResult),
    /// Result column names in order.
    ColumnNames(Vec<String>),
    /// Close succeeded.
    Closed,
}

impl Answer {
    /// Returns the statement handle of a prepare answer.
    #[must_use]
    pub fn into_statement(self) -> Option<Statement> {
        match self {
            Self::Prepared(statement) => Some(statement),
            _ => None,
        }
    }

    /// Returns the step result of a step answer.
    #[must_use]
    pub fn into_step(self) -> Option<StepResult> {
        match self {
            Self::Step(step) => Some(step),
            _ => None,
        }
    }

    /// Returns the names of a column-names answer.
    #[must_use]
    pub fn into_column_names(self) -> Option<Vec<String>> {
        match self {
            Self::ColumnNames(names) => Some(names),
            _ => None,
        }
    }
}

/// Outcome of advancing a statement by one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// One materialized row, one value per result column.
    Row(Vec<Value>),
    /// No more rows.
    Done,
    /// Engine contention; the caller must step again.
    Busy,
}

// ============================================================================
// SECTION: Endpoints
// ============================================================================

/// Receiver for the single reply of a [`ReplyTo::oneshot`] destination.
#[derive(Debug)]
pub struct Pending {
    /// Identity shared with the matching destination.
    caller: CallerId,
    /// Single-slot reply channel.
    receiver: Receiver<Reply>,
}

impl Pending {
    /// Returns the caller identity.
    #[must_use]
    pub const fn caller(&self) -> CallerId {
        self.caller
    }

    /// Blocks until the reply arrives.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unanswered`] when the command was dropped
    /// without a reply.
    pub fn wait(self) -> Result<Reply, DispatchError> {
        self.receiver.recv().map_err(|_| DispatchError::Unanswered)
    }

    /// Blocks up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unanswered`] when the command was dropped
    /// without a reply. A timeout yields `Ok(None)`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<Reply>, DispatchError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(reply) => Ok(Some(reply)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DispatchError::Unanswered),
        }
    }

    /// Returns the reply if it has already arrived.
    #[must_use]
    pub fn try_take(&self) -> Option<Reply> {
        self.receiver.try_recv().ok()
    }
}

/// Long-lived inbox receiving replies for many commands.
#[derive(Debug)]
pub struct Mailbox {
    /// Identity stamped on every destination from this mailbox.
    caller: CallerId,
    /// Sender cloned into destinations.
    sender: Sender<Reply>,
    /// Inbox.
    receiver: Receiver<Reply>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    /// Creates an empty mailbox with a fresh caller identity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            caller: CallerId::fresh(),
            sender,
            receiver,
        }
    }

    /// Returns the caller identity.
    #[must_use]
    pub const fn caller(&self) -> CallerId {
        self.caller
    }

    /// Returns a destination delivering into this mailbox.
    #[must_use]
    pub fn reply_to(&self) -> ReplyTo {
        ReplyTo {
            caller: self.caller,
            sender: self.sender.clone(),
        }
    }

    /// Blocks until a reply arrives.
    pub fn recv(&self) -> Option<Reply> {
        self.receiver.recv().ok()
    }

    /// Blocks up to `timeout` for a reply.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Reply> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Returns a reply if one is already waiting.
    pub fn try_recv(&self) -> Option<Reply> {
        self.receiver.try_recv().ok()
    }

    /// Returns the number of undelivered replies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true when no replies are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
