// crates/serialite/src/lib.rs
// ============================================================================
// Module: Serialite Library
// Description: Asynchronous, serialized command bridge over embedded SQLite.
// Purpose: Let many callers share one engine connection without blocking.
// Dependencies: crossbeam-channel, rusqlite, serialite-config, tracing
// ============================================================================

//! ## Overview
//! `serialite` gives every engine connection a dedicated worker thread and a
//! FIFO command queue. Callers dispatch commands from any thread; each
//! dispatch returns a [`CorrelationToken`] immediately and the worker later
//! delivers exactly one [`Reply`] to the caller's [`ReplyTo`].
//!
//! ```no_run
//! use serialite::{Bridge, BridgeConfig, ReplyTo};
//!
//! let bridge = Bridge::new(BridgeConfig::default())?;
//! let (opened, pending) = ReplyTo::oneshot();
//! let (connection, _token) = bridge.open(":memory:", opened)?;
//! assert!(pending.wait()?.outcome.is_ok());
//! let (created, pending) = ReplyTo::oneshot();
//! connection.exec("CREATE TABLE t(a TEXT, b INT)", created)?;
//! assert!(pending.wait()?.outcome.is_ok());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Security posture: SQL text and bound values are passed to the engine
//! as-is; callers own injection safety and should bind untrusted input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bridge;
mod command;
pub mod connection;
mod engine;
pub mod error;
pub mod queue;
pub mod reply;
mod retry;
pub mod statement;
pub mod telemetry;
pub mod value;
mod worker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bridge::Bridge;
pub use command::CorrelationToken;
pub use connection::Connection;
pub use connection::ConnectionId;
pub use error::BridgeError;
pub use error::DispatchError;
pub use error::EngineError;
pub use queue::BlockingQueue;
pub use reply::Answer;
pub use reply::CallerId;
pub use reply::Mailbox;
pub use reply::Pending;
pub use reply::Reply;
pub use reply::ReplyTo;
pub use reply::StepResult;
pub use serialite_config::BridgeConfig;
pub use serialite_config::ConfigError;
pub use statement::Statement;
pub use statement::StatementId;
pub use telemetry::ConnectionStats;
pub use telemetry::TelemetryError;
pub use telemetry::init_tracing;
pub use value::Value;
pub use value::ValueKind;
pub use worker::WorkerState;
