// crates/serialite/tests/lifecycle.rs
// ============================================================================
// Module: Connection Lifecycle Tests
// Description: Open/close state handling, error replies, and teardown.
// Purpose: Validate that failures become replies and teardown rejects late work.
// ============================================================================

//! ## Overview
//! Lifecycle and error-path coverage:
//! - Commands before open and after close reply `NotOpen`
//! - Invalid filenames, empty statements, and double opens
//! - Argument count and type checks on bind
//! - Close refused while statements are alive
//! - Teardown on last drop and on bridge shutdown

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::time::Duration;
use std::time::Instant;

use serialite::Answer;
use serialite::BridgeError;
use serialite::DispatchError;
use serialite::ReplyTo;
use serialite::StepResult;
use serialite::WorkerState;
use serialite::values;

use crate::common::bind;
use crate::common::bridge;
use crate::common::exec;
use crate::common::expect_ok;
use crate::common::open_memory;
use crate::common::prepare;
use crate::common::query;
use crate::common::request;
use crate::common::step;

type TestResult = Result<(), String>;

/// Polls `condition` until it holds or the deadline passes.
fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ============================================================================
// SECTION: Open and Close
// ============================================================================

#[test]
fn commands_before_open_reply_not_open() -> TestResult {
    let bridge = bridge();
    let connection = bridge.start().map_err(|err| err.to_string())?;
    assert!(!connection.is_open());
    assert_eq!(request(|to| connection.exec("SELECT 1", to))?.err(), Some(BridgeError::NotOpen));
    assert_eq!(request(|to| connection.prepare("SELECT 1", to))?.err(), Some(BridgeError::NotOpen));
    assert_eq!(request(|to| connection.close(to))?.err(), Some(BridgeError::NotOpen));
    Ok(())
}

#[test]
fn open_then_close_then_commands_reply_not_open() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    assert!(connection.is_open());
    assert!(matches!(expect_ok(|to| connection.close(to))?, Answer::Closed));
    assert!(!connection.is_open());
    assert_eq!(request(|to| connection.exec("SELECT 1", to))?.err(), Some(BridgeError::NotOpen));
    assert_eq!(connection.worker_state(), WorkerState::Running);
    Ok(())
}

#[test]
fn reopening_after_close_starts_a_fresh_database() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    exec(&connection, "CREATE TABLE gone(v INT)")?;
    expect_ok(|to| connection.close(to))?;
    expect_ok(|to| connection.open(":memory:", to))?;
    let missing = request(|to| connection.exec("SELECT v FROM gone", to))?;
    assert!(matches!(missing, Err(BridgeError::Engine(err)) if err.message.contains("no such table")));
    Ok(())
}

#[test]
fn second_open_replies_already_open() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    assert_eq!(
        request(|to| connection.open(":memory:", to))?.err(),
        Some(BridgeError::AlreadyOpen)
    );
    exec(&connection, "CREATE TABLE still_usable(v INT)")?;
    Ok(())
}

#[test]
fn empty_and_oversized_filenames_are_invalid() -> TestResult {
    let bridge = bridge();
    let connection = bridge.start().map_err(|err| err.to_string())?;
    let invalid = Some(BridgeError::InvalidArgument("invalid filename".to_string()));
    assert_eq!(request(|to| connection.open("", to))?.err(), invalid);
    let long = "x".repeat(bridge.config().engine.max_path_bytes + 1);
    assert_eq!(request(|to| connection.open(long, to))?.err(), invalid);
    assert!(!connection.is_open());
    Ok(())
}

#[test]
fn unopenable_path_replies_engine_error() -> TestResult {
    let bridge = bridge();
    let connection = bridge.start().map_err(|err| err.to_string())?;
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("missing").join("db.sqlite");
    let outcome = request(|to| connection.open(path.to_string_lossy(), to))?;
    assert!(matches!(outcome, Err(BridgeError::Engine(_))));
    assert!(!connection.is_open());
    Ok(())
}

#[test]
fn close_is_refused_while_statements_are_alive() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    let statement = prepare(&connection, "SELECT 1")?;
    let refused = request(|to| connection.close(to))?;
    assert!(matches!(refused, Err(BridgeError::Engine(ref err)) if err.is_busy()));
    assert!(connection.is_open());
    assert_eq!(step(&statement)?, StepResult::Row(values![1_i64]));
    drop(statement);
    assert!(matches!(expect_ok(|to| connection.close(to))?, Answer::Closed));
    Ok(())
}

// ============================================================================
// SECTION: Statements
// ============================================================================

#[test]
fn empty_statement_is_an_invalid_argument() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    for sql in ["", "   ", "-- only a comment"] {
        assert_eq!(
            request(|to| connection.prepare(sql, to))?.err(),
            Some(BridgeError::InvalidArgument("empty statement".to_string()))
        );
    }
    Ok(())
}

#[test]
fn syntax_errors_reply_without_stopping_the_worker() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    let bad = request(|to| connection.prepare("SELEC 1", to))?;
    assert!(matches!(bad, Err(BridgeError::Engine(ref err)) if err.message.contains("syntax error")));
    let bad_exec = request(|to| connection.exec("CREATE TABLE", to))?;
    assert!(matches!(bad_exec, Err(BridgeError::Engine(_))));
    assert_eq!(query(&connection, "SELECT 7")?, vec![values![7_i64]]);
    Ok(())
}

#[test]
fn bind_count_mismatch_resets_and_allows_reuse() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    exec(&connection, "CREATE TABLE t(a TEXT, b INT)")?;
    let insert = prepare(&connection, "INSERT INTO t VALUES(?, ?)")?;
    let mismatch = request(|to| insert.bind(values!["only one"], to))?;
    assert_eq!(
        mismatch.err(),
        Some(BridgeError::ArgCountMismatch {
            expected: 2,
            actual: 1,
        })
    );
    bind(&insert, values!["ok", 1_i64])?;
    assert_eq!(step(&insert)?, StepResult::Done);
    assert_eq!(query(&connection, "SELECT a, b FROM t")?, vec![values!["ok", 1_i64]]);
    Ok(())
}

#[test]
fn text_with_nul_is_a_wrong_type() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    let select = prepare(&connection, "SELECT ?, ?")?;
    let outcome = request(|to| select.bind(values![1_i64, "a\0b"], to))?;
    assert!(matches!(outcome, Err(BridgeError::WrongType { index: 2, .. })));
    bind(&select, values![1_i64, b"a\0b".to_vec()])?;
    assert_eq!(step(&select)?, StepResult::Row(values![1_i64, b"a\0b".to_vec()]));
    Ok(())
}

#[test]
fn constraint_failures_during_step_are_unexpected_results() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    exec(&connection, "CREATE TABLE u(v INT UNIQUE); INSERT INTO u VALUES(1);")?;
    let insert = prepare(&connection, "INSERT INTO u VALUES(?)")?;
    bind(&insert, values![1_i64])?;
    let outcome = request(|to| insert.step(to))?;
    assert!(matches!(
        outcome,
        Err(BridgeError::UnexpectedResult { code }) if code & 0xff == rusqlite::ffi::SQLITE_CONSTRAINT
    ));
    bind(&insert, values![2_i64])?;
    assert_eq!(step(&insert)?, StepResult::Done);
    Ok(())
}

// ============================================================================
// SECTION: Teardown
// ============================================================================

#[test]
fn bridge_shutdown_rejects_late_dispatch() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    let statement = prepare(&connection, "SELECT 1")?;
    assert_eq!(bridge.live_connections(), 1);
    bridge.shutdown();
    assert!(connection.is_torn_down());
    assert_eq!(connection.worker_state(), WorkerState::Stopped);
    assert!(!connection.is_open());

    let (reply_to, pending) = ReplyTo::oneshot();
    assert_eq!(connection.exec("SELECT 1", reply_to), Err(DispatchError::Closed));
    assert!(matches!(pending.wait(), Err(DispatchError::Unanswered)));
    let (reply_to, _pending) = ReplyTo::oneshot();
    assert_eq!(statement.step(reply_to), Err(DispatchError::Closed));
    assert_eq!(connection.stats().commands_rejected, 2);
    Ok(())
}

#[test]
fn commands_queued_before_teardown_are_all_answered() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    exec(&connection, "CREATE TABLE q(v INT)")?;
    let mut pending = Vec::new();
    for v in 0 .. 32 {
        let (reply_to, receiver) = ReplyTo::oneshot();
        connection
            .exec(format!("INSERT INTO q VALUES({v})"), reply_to)
            .map_err(|err| err.to_string())?;
        pending.push(receiver);
    }
    bridge.shutdown();
    for receiver in pending {
        let reply = receiver.wait().map_err(|err| err.to_string())?;
        assert!(matches!(reply.outcome, Ok(Answer::Executed)));
    }
    Ok(())
}

#[test]
fn dropping_the_last_handle_stops_the_worker() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    let statement = prepare(&connection, "SELECT 1")?;
    drop(connection);
    assert_eq!(bridge.live_connections(), 1);
    assert_eq!(step(&statement)?, StepResult::Row(values![1_i64]));
    drop(statement);
    assert!(eventually(|| bridge.live_connections() == 0));
    Ok(())
}

#[test]
fn unanswered_prepare_releases_the_connection() -> TestResult {
    let bridge = bridge();
    let connection = open_memory(&bridge)?;
    let (reply_to, pending) = ReplyTo::oneshot();
    connection.prepare("SELECT 1", reply_to).map_err(|err| err.to_string())?;
    drop(pending);
    drop(connection);
    assert!(eventually(|| bridge.live_connections() == 0));
    Ok(())
}
