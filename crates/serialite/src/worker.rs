// crates/serialite/src/worker.rs
// ============================================================================
// Module: Connection Worker
// Description: Dedicated thread that executes queued commands in order.
// Purpose: Own the engine handle and every compiled statement exclusively.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! One worker runs per connection. It pops commands in FIFO order, executes
//! each against the engine handle it alone owns, and sends exactly one reply
//! per caller-visible command. Failures become error replies; the loop only
//! ends on the stop signal.
//!
//! The worker has two nested phases. Without an engine handle it answers
//! everything except open with `NotOpen`. While a handle is open, a session
//! holds the compiled statements, which borrow the handle and are all
//! finalized when the session ends.
//!
//! ## Invariants
//! - States move Running -> Stopping -> Stopped and never back.
//! - Nothing executes after the stop signal is popped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

use serialite_config::BridgeConfig;
use tracing::debug;
use tracing::info_span;
use tracing::trace;
use tracing::warn;

use crate::command::Command;
use crate::command::CorrelationToken;
use crate::command::Payload;
use crate::connection::Connection;
use crate::connection::ConnectionId;
use crate::connection::ConnectionInner;
use crate::engine;
use crate::engine::EngineConnection;
use crate::engine::RawStatement;
use crate::error::BridgeError;
use crate::queue::BlockingQueue;
use crate::reply::Answer;
use crate::reply::ReplyTo;
use crate::retry::retry_on_busy;
use crate::statement::Statement;
use crate::statement::StatementId;
use crate::telemetry::StatsCounters;

// ============================================================================
// SECTION: Worker State
// ============================================================================

/// Lifecycle state of a connection worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Popping and executing commands.
    Running,
    /// Stop signal popped; releasing statements.
    Stopping,
    /// Loop exited.
    Stopped,
}

impl WorkerState {
    /// Encodes the state for atomic storage.
    const fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Stopping => 1,
            Self::Stopped => 2,
        }
    }

    /// Decodes an atomically stored state.
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Worker state and open flag, readable from any thread.
#[derive(Debug)]
pub(crate) struct WorkerStatus {
    /// Encoded [`WorkerState`].
    state: AtomicU8,
    /// True while the engine handle is open.
    open: AtomicBool,
}

impl WorkerStatus {
    /// Creates a status for a freshly spawned worker.
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Running.as_u8()),
            open: AtomicBool::new(false),
        }
    }

    /// Returns the current state.
    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Records a state transition.
    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Returns true while the engine handle is open.
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Records whether the engine handle is open.
    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
    }
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// How an open session ended.
enum SessionExit {
    /// A close command arrived with no statements outstanding.
    Close {
        /// Token of the close command.
        token: CorrelationToken,
        /// Reply destination of the close command.
        reply_to: Option<ReplyTo>,
    },
    /// The stop signal arrived or the queue ended.
    Stop,
}

/// Compiled statements held during one open session.
type StatementTable<'conn> = HashMap<StatementId, RawStatement<'conn>>;

/// Loop state owned by the worker thread.
pub(crate) struct ConnectionWorker {
    /// Connection identifier for logs.
    id: ConnectionId,
    /// Command source.
    queue: Arc<BlockingQueue<Command>>,
    /// Published lifecycle state.
    status: Arc<WorkerStatus>,
    /// Published counters.
    stats: Arc<StatsCounters>,
    /// Bridge configuration.
    config: Arc<BridgeConfig>,
    /// Connection handle used to build statement handles.
    owner: Weak<ConnectionInner>,
    /// Next statement identifier.
    next_statement: u64,
}

impl ConnectionWorker {
    /// Creates the worker for one connection.
    pub(crate) const fn new(
        id: ConnectionId,
        queue: Arc<BlockingQueue<Command>>,
        status: Arc<WorkerStatus>,
        stats: Arc<StatsCounters>,
        config: Arc<BridgeConfig>,
        owner: Weak<ConnectionInner>,
    ) -> Self {
        Self {
            id,
            queue,
            status,
            stats,
            config,
            owner,
            next_statement: 1,
        }
    }

    /// Runs until the stop signal; returns the engine handle if still open.
    pub(crate) fn run(mut self) -> Option<EngineConnection> {
        let span = info_span!("connection_worker", connection = %self.id);
        let _guard = span.enter();
        debug!("worker started");
        let engine = self.run_closed();
        self.status.set_state(WorkerState::Stopped);
        debug!(engine_open = engine.is_some(), "worker stopped");
        engine
    }

    /// Serves commands while no engine handle is open.
    fn run_closed(&mut self) -> Option<EngineConnection> {
        while let Some(command) = self.queue.pop() {
            let Command {
                token,
                reply_to,
                payload,
            } = command;
            trace!(%token, command = payload.label(), "executing");
            let outcome = match payload {
                Payload::Stop => {
                    self.status.set_state(WorkerState::Stopping);
                    self.stats.record_executed();
                    return None;
                }
                Payload::Open {
                    path,
                } => match engine::open(&path, &self.config.engine) {
                    Ok(engine) => {
                        self.status.set_open(true);
                        debug!(%path, "engine opened");
                        self.answer(token, reply_to, Ok(Answer::Opened));
                        match self.run_open(engine) {
                            Some(engine) => return Some(engine),
                            None => continue,
                        }
                    }
                    Err(err) => Err(err),
                },
                Payload::Finalize {
                    ..
                } => {
                    self.stats.record_executed();
                    continue;
                }
                Payload::Exec {
                    ..
                }
                | Payload::Prepare {
                    ..
                }
                | Payload::Bind {
                    ..
                }
                | Payload::Step {
                    ..
                }
                | Payload::ColumnNames {
                    ..
                }
                | Payload::Close => Err(BridgeError::NotOpen),
            };
            self.answer(token, reply_to, outcome);
        }
        None
    }

    /// Serves sessions on `engine` until a successful close or the stop signal.
    ///
    /// Returns `None` after a successful close and the still-open handle on stop.
    fn run_open(&mut self, mut engine: EngineConnection) -> Option<EngineConnection> {
        loop {
            match self.serve_session(&engine) {
                SessionExit::Stop => return Some(engine),
                SessionExit::Close {
                    token,
                    reply_to,
                } => match engine::close(engine) {
                    Ok(()) => {
                        self.status.set_open(false);
                        debug!("engine closed");
                        self.answer(token, reply_to, Ok(Answer::Closed));
                        return None;
                    }
                    Err((still_open, err)) => {
                        warn!(error = %err, "engine refused to close");
                        self.answer(token, reply_to, Err(BridgeError::Engine(err)));
                        engine = still_open;
                    }
                },
            }
        }
    }

    /// Serves commands against an open engine handle.
    fn serve_session(&mut self, engine: &EngineConnection) -> SessionExit {
        let mut statements = StatementTable::new();
        let exit = loop {
            let Some(command) = self.queue.pop() else {
                break SessionExit::Stop;
            };
            let Command {
                token,
                reply_to,
                payload,
            } = command;
            trace!(%token, command = payload.label(), "executing");
            let outcome = match payload {
                Payload::Stop => {
                    self.status.set_state(WorkerState::Stopping);
                    self.stats.record_executed();
                    break SessionExit::Stop;
                }
                Payload::Close if statements.is_empty() => {
                    break SessionExit::Close {
                        token,
                        reply_to,
                    };
                }
                Payload::Close => Err(BridgeError::Engine(engine::close_refused(statements.len()))),
                Payload::Open {
                    ..
                } => Err(BridgeError::AlreadyOpen),
                Payload::Exec {
                    sql,
                } => engine::execute(engine, &sql).map(|()| Answer::Executed),
                Payload::Prepare {
                    sql,
                } => self.prepare(engine, &mut statements, sql),
                Payload::Bind {
                    statement,
                    values,
                } => statements
                    .get_mut(&statement)
                    .ok_or(BridgeError::NoStatement)
                    .and_then(|raw| raw.bind_all(&values))
                    .map(|()| Answer::Bound),
                Payload::Step {
                    statement,
                } => statements
                    .get_mut(&statement)
                    .ok_or(BridgeError::NoStatement)
                    .and_then(RawStatement::step)
                    .map(Answer::Step),
                Payload::ColumnNames {
                    statement,
                } => statements
                    .get(&statement)
                    .ok_or(BridgeError::NoStatement)
                    .and_then(RawStatement::column_names)
                    .map(Answer::ColumnNames),
                Payload::Finalize {
                    statement,
                } => {
                    if statements.remove(&statement).is_some() {
                        self.stats.record_finalized(1);
                    }
                    self.stats.record_executed();
                    continue;
                }
            };
            self.answer(token, reply_to, outcome);
        };
        let outstanding = statements.len();
        drop(statements);
        if outstanding > 0 {
            self.stats.record_finalized(u64::try_from(outstanding).unwrap_or(u64::MAX));
            debug!(outstanding, "finalized outstanding statements");
        }
        exit
    }

    /// Compiles `sql` with busy retry and registers the statement.
    fn prepare<'conn>(
        &mut self,
        engine: &'conn EngineConnection,
        statements: &mut StatementTable<'conn>,
        sql: String,
    ) -> Result<Answer, BridgeError> {
        let raw = retry_on_busy(self.config.prepare, || engine::prepare(engine, &sql))?;
        let Some(raw) = raw else {
            return Err(BridgeError::InvalidArgument("empty statement".to_string()));
        };
        let Some(owner) = self.owner.upgrade() else {
            return Err(BridgeError::NotOpen);
        };
        let id = StatementId::new(self.next_statement);
        self.next_statement += 1;
        let handle = Statement::new(Connection::from_inner(owner), id, raw.parameter_count(), sql);
        statements.insert(id, raw);
        self.stats.record_prepared();
        trace!(statement = %id, "statement prepared");
        Ok(Answer::Prepared(handle))
    }

    /// Sends the reply for a caller-visible command.
    fn answer(
        &self,
        token: CorrelationToken,
        reply_to: Option<ReplyTo>,
        outcome: Result<Answer, BridgeError>,
    ) {
        self.stats.record_executed();
        if let Err(err) = &outcome {
            debug!(%token, error = %err, "command failed");
        }
        let Some(reply_to) = reply_to else {
            return;
        };
        if let Err(reply) = reply_to.deliver(token, outcome) {
            self.stats.record_undeliverable();
            warn!(%token, caller = %reply.caller, "reply endpoint gone; reply dropped");
        }
    }
}
