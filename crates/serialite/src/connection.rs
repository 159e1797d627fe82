// crates/serialite/src/connection.rs
// ============================================================================
// Module: Connection Handle
// Description: Caller-facing handle for one serialized engine connection.
// Purpose: Turn dispatch calls into queued commands and own worker teardown.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! A [`Connection`] is a cheap, cloneable handle. Each dispatch method stamps a
//! fresh [`CorrelationToken`], pushes one command, and returns the token
//! immediately; the outcome arrives later at the supplied [`ReplyTo`].
//!
//! When the last handle (including every [`crate::Statement`] of the
//! connection) is dropped, or the bridge shuts down, the connection is torn
//! down in a fixed order: queue the stop signal, join the worker, discard
//! anything left in the queue, then close the engine handle if the worker
//! handed it back still open.
//!
//! ## Invariants
//! - Once teardown queues the stop signal, every later dispatch fails
//!   synchronously with [`DispatchError::Closed`].
//! - Teardown is idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread;
use std::thread::JoinHandle;

use serialite_config::BridgeConfig;
use tracing::debug;
use tracing::warn;

use crate::command::Command;
use crate::command::CorrelationToken;
use crate::command::Payload;
use crate::command::TokenSource;
use crate::engine;
use crate::engine::EngineConnection;
use crate::error::DispatchError;
use crate::queue::BlockingQueue;
use crate::reply::ReplyTo;
use crate::telemetry::ConnectionStats;
use crate::telemetry::StatsCounters;
use crate::worker::ConnectionWorker;
use crate::worker::WorkerState;
use crate::worker::WorkerStatus;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Bridge-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
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

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Handle to one serialized engine connection.
#[derive(Clone)]
pub struct Connection {
    /// Shared connection state.
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("state", &self.inner.status.state())
            .field("open", &self.inner.status.is_open())
            .finish()
    }
}

impl Connection {
    /// Creates the connection state and spawns its worker thread.
    pub(crate) fn spawn(
        id: ConnectionId,
        config: Arc<BridgeConfig>,
        tokens: Arc<TokenSource>,
    ) -> Result<Self, DispatchError> {
        let inner = Arc::new(ConnectionInner {
            id,
            queue: Arc::new(BlockingQueue::new()),
            status: Arc::new(WorkerStatus::new()),
            stats: Arc::new(StatsCounters::default()),
            tokens,
            worker: Mutex::new(None),
        });
        let worker = ConnectionWorker::new(
            id,
            Arc::clone(&inner.queue),
            Arc::clone(&inner.status),
            Arc::clone(&inner.stats),
            Arc::clone(&config),
            Arc::downgrade(&inner),
        );
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", config.worker.thread_name_prefix, id.get()));
        if let Some(stack_size) = config.worker.stack_size_bytes {
            builder = builder.stack_size(stack_size);
        }
        let handle = builder
            .spawn(move || worker.run())
            .map_err(|err| DispatchError::Spawn(err.to_string()))?;
        *inner.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!(connection = %id, "connection worker spawned");
        Ok(Self::from_inner(inner))
    }

    /// Wraps shared state in a handle.
    pub(crate) const fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self {
            inner,
        }
    }

    /// Returns the shared state for registry bookkeeping.
    pub(crate) const fn inner(&self) -> &Arc<ConnectionInner> {
        &self.inner
    }

    /// Returns the connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Queues an open of the engine file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] once the connection is torn down.
    pub fn open(
        &self,
        path: impl Into<String>,
        reply_to: ReplyTo,
    ) -> Result<CorrelationToken, DispatchError> {
        self.inner.dispatch(
            Payload::Open {
                path: path.into(),
            },
            reply_to,
        )
    }

    /// Queues execution of `sql`, which may hold several statements.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] once the connection is torn down.
    pub fn exec(
        &self,
        sql: impl Into<String>,
        reply_to: ReplyTo,
    ) -> Result<CorrelationToken, DispatchError> {
        self.inner.dispatch(
            Payload::Exec {
                sql: sql.into(),
            },
            reply_to,
        )
    }

    /// Queues compilation of the first statement in `sql`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] once the connection is torn down.
    pub fn prepare(
        &self,
        sql: impl Into<String>,
        reply_to: ReplyTo,
    ) -> Result<CorrelationToken, DispatchError> {
        self.inner.dispatch(
            Payload::Prepare {
                sql: sql.into(),
            },
            reply_to,
        )
    }

    /// Queues a close of the engine handle.
    ///
    /// The close is refused with a busy engine error while statement handles
    /// of this connection are still alive.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] once the connection is torn down.
    pub fn close(&self, reply_to: ReplyTo) -> Result<CorrelationToken, DispatchError> {
        self.inner.dispatch(Payload::Close, reply_to)
    }

    /// Returns the worker's lifecycle state.
    #[must_use]
    pub fn worker_state(&self) -> WorkerState {
        self.inner.status.state()
    }

    /// Returns true while the engine handle is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.status.is_open()
    }

    /// Returns true once teardown has queued the stop signal.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.queue.is_closed()
    }

    /// Returns a snapshot of this connection's counters.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.inner.stats.snapshot(self.inner.queue.len())
    }

    /// Queues an unanswered internal command.
    pub(crate) fn push_internal(&self, command: Command) -> Result<(), DispatchError> {
        self.inner.queue.push(command).map_err(|_| DispatchError::Closed)
    }

    /// Queues a caller-visible command.
    pub(crate) fn dispatch(
        &self,
        payload: Payload,
        reply_to: ReplyTo,
    ) -> Result<CorrelationToken, DispatchError> {
        self.inner.dispatch(payload, reply_to)
    }
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// State shared by all handles of one connection.
pub(crate) struct ConnectionInner {
    /// Connection identifier.
    id: ConnectionId,
    /// Command queue consumed by the worker.
    queue: Arc<BlockingQueue<Command>>,
    /// Worker lifecycle state.
    status: Arc<WorkerStatus>,
    /// Activity counters.
    stats: Arc<StatsCounters>,
    /// Bridge-wide token generator.
    tokens: Arc<TokenSource>,
    /// Worker thread; `None` before spawn and after teardown.
    worker: Mutex<Option<JoinHandle<Option<EngineConnection>>>>,
}

impl ConnectionInner {
    /// Stamps a token and pushes one caller-visible command.
    fn dispatch(
        &self,
        payload: Payload,
        reply_to: ReplyTo,
    ) -> Result<CorrelationToken, DispatchError> {
        let token = self.tokens.next_token();
        let command = Command {
            token,
            reply_to: Some(reply_to),
            payload,
        };
        if self.queue.push(command).is_ok() {
            self.stats.record_accepted();
            Ok(token)
        } else {
            self.stats.record_rejected();
            Err(DispatchError::Closed)
        }
    }

    /// Stops the worker and releases every resource of this connection.
    pub(crate) fn teardown(&self) {
        let signalled = self.queue.close_with(Command::stop()).is_ok();
        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if !signalled && handle.is_none() {
            return;
        }
        let engine = match handle {
            Some(handle) if handle.thread().id() == thread::current().id() => {
                debug!(connection = %self.id, "teardown on worker thread; worker exits after the current command");
                None
            }
            Some(handle) => handle.join().unwrap_or_else(|_| {
                warn!(connection = %self.id, "connection worker panicked");
                None
            }),
            None => None,
        };
        let leftover = self.queue.drain();
        if !leftover.is_empty() {
            debug!(connection = %self.id, discarded = leftover.len(), "discarded queued commands");
        }
        drop(leftover);
        if let Some(engine) = engine {
            self.status.set_open(false);
            if let Err((still_open, err)) = engine::close(engine) {
                warn!(connection = %self.id, error = %err, "engine close failed during teardown; handle leaked");
                leak_engine(still_open);
            }
        }
        debug!(connection = %self.id, "connection torn down");
    }
}

/// Leaks an engine handle the engine refused to close; dropping it would panic.
#[allow(clippy::mem_forget, reason = "rusqlite panics when dropping a connection that fails to close.")]
fn leak_engine(engine: EngineConnection) {
    std::mem::forget(engine);
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.teardown();
    }
}
