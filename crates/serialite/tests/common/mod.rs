// crates/serialite/tests/common/mod.rs
// ============================================================================
// Module: Test Support
// Description: Shared helpers for serialite integration tests.
// Purpose: Issue one command and wait for its correlated reply.
// ============================================================================

//! Shared helpers for integration tests.

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers.")]

use std::time::Duration;

use serialite::Answer;
use serialite::Bridge;
use serialite::BridgeConfig;
use serialite::BridgeError;
use serialite::Connection;
use serialite::CorrelationToken;
use serialite::DispatchError;
use serialite::ReplyTo;
use serialite::Statement;
use serialite::StepResult;
use serialite::Value;

/// Upper bound on any single reply wait.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Dispatches one command through a oneshot destination and waits for its reply.
pub fn request(
    dispatch: impl FnOnce(ReplyTo) -> Result<CorrelationToken, DispatchError>,
) -> Result<Result<Answer, BridgeError>, String> {
    let (reply_to, pending) = ReplyTo::oneshot();
    let caller = reply_to.caller();
    let token = dispatch(reply_to).map_err(|err| err.to_string())?;
    let reply = pending
        .wait_timeout(REPLY_TIMEOUT)
        .map_err(|err| err.to_string())?
        .ok_or_else(|| format!("no reply for {token} within {REPLY_TIMEOUT:?}"))?;
    if reply.token != token || reply.caller != caller {
        return Err(format!("reply {} does not match request {token}", reply.token));
    }
    Ok(reply.outcome)
}

/// Like [`request`], but treats an error reply as a test failure.
pub fn expect_ok(
    dispatch: impl FnOnce(ReplyTo) -> Result<CorrelationToken, DispatchError>,
) -> Result<Answer, String> {
    request(dispatch)?.map_err(|err| err.to_string())
}

/// Starts a bridge with default configuration.
pub fn bridge() -> Bridge {
    Bridge::new(BridgeConfig::default()).expect("default config is valid")
}

/// Opens an in-memory database on a fresh connection.
pub fn open_memory(bridge: &Bridge) -> Result<Connection, String> {
    let connection = bridge.start().map_err(|err| err.to_string())?;
    match expect_ok(|to| connection.open(":memory:", to))? {
        Answer::Opened => Ok(connection),
        other => Err(format!("unexpected open answer: {other:?}")),
    }
}

/// Executes `sql` and requires success.
pub fn exec(connection: &Connection, sql: &str) -> Result<(), String> {
    match expect_ok(|to| connection.exec(sql, to))? {
        Answer::Executed => Ok(()),
        other => Err(format!("unexpected exec answer: {other:?}")),
    }
}

/// Prepares `sql` and returns the statement handle.
pub fn prepare(connection: &Connection, sql: &str) -> Result<Statement, String> {
    expect_ok(|to| connection.prepare(sql, to))?
        .into_statement()
        .ok_or_else(|| "prepare answer carried no statement".to_string())
}

/// Binds `values` and requires success.
pub fn bind(statement: &Statement, values: Vec<Value>) -> Result<(), String> {
    match expect_ok(|to| statement.bind(values, to))? {
        Answer::Bound => Ok(()),
        other => Err(format!("unexpected bind answer: {other:?}")),
    }
}

/// Steps once and returns the step result.
pub fn step(statement: &Statement) -> Result<StepResult, String> {
    expect_ok(|to| statement.step(to))?
        .into_step()
        .ok_or_else(|| "step answer carried no result".to_string())
}

/// Steps until done and collects every row.
pub fn collect_rows(statement: &Statement) -> Result<Vec<Vec<Value>>, String> {
    let mut rows = Vec::new();
    loop {
        match step(statement)? {
            StepResult::Row(row) => rows.push(row),
            StepResult::Done => return Ok(rows),
            StepResult::Busy => {}
        }
    }
}

/// Prepares and runs a query, returning every row.
pub fn query(connection: &Connection, sql: &str) -> Result<Vec<Vec<Value>>, String> {
    let statement = prepare(connection, sql)?;
    collect_rows(&statement)
}
