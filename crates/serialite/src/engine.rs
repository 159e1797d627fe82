// crates/serialite/src/engine.rs
// ============================================================================
// Module: Engine Adapter
// Description: SQLite handle management and compiled statement primitives.
// Purpose: Confine every raw engine call to one worker-owned module.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! Connection lifecycle (open, exec, close) goes through rusqlite's safe
//! [`rusqlite::Connection`]. Compiled statements need step state that
//! survives across independently queued commands, which rusqlite's borrowing
//! `Rows` cannot express, so [`RawStatement`] wraps the statement pointer
//! directly.
//!
//! Security posture: values crossing into the engine are bound with
//! `SQLITE_TRANSIENT`, so the engine owns a private copy; values crossing out
//! are copied before the next engine call on the same statement.
//!
//! ## Invariants
//! - A [`RawStatement`] borrows its connection, so it is always finalized
//!   before the connection can be closed or dropped.
//! - Raw statements are `!Send`; they never leave the worker thread.

#![allow(unsafe_code, reason = "Compiled statements are driven through the SQLite C API.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::CStr;
use std::ffi::c_char;
use std::ffi::c_int;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr;
use std::ptr::NonNull;
use std::time::Duration;

use rusqlite::OpenFlags;
use rusqlite::ffi;
use serialite_config::EngineConfig;
use serialite_config::OpenMode;

use crate::error::BridgeError;
use crate::error::EngineError;
use crate::reply::StepResult;
use crate::value::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Engine connection handle owned by a worker.
pub(crate) type EngineConnection = rusqlite::Connection;

/// Engine message reported when close is refused.
const CLOSE_REFUSED_MESSAGE: &str = "unable to close due to unfinalized statements";

// ============================================================================
// SECTION: Connection Lifecycle
// ============================================================================

/// Opens the engine file at `path` with the configured mode and busy timeout.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidArgument`] for an unusable filename and
/// [`BridgeError::Engine`] when the engine refuses to open.
pub(crate) fn open(path: &str, config: &EngineConfig) -> Result<EngineConnection, BridgeError> {
    if path.is_empty() || path.len() > config.max_path_bytes || path.contains('\0') {
        return Err(BridgeError::InvalidArgument("invalid filename".to_string()));
    }
    let connection = rusqlite::Connection::open_with_flags(path, open_flags(config.open_mode))
        .map_err(EngineError::from)?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(EngineError::from)?;
    Ok(connection)
}

/// Maps the configured open mode onto engine flags.
fn open_flags(mode: OpenMode) -> OpenFlags {
    let access = match mode {
        OpenMode::ReadWriteCreate => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
        OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
    };
    access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

/// Executes one or more statements, discarding any result rows.
pub(crate) fn execute(connection: &EngineConnection, sql: &str) -> Result<(), BridgeError> {
    connection.execute_batch(sql).map_err(|err| BridgeError::Engine(err.into()))
}

/// Closes the engine handle, handing it back on failure.
pub(crate) fn close(
    connection: EngineConnection,
) -> Result<(), (EngineConnection, EngineError)> {
    connection.close().map_err(|(connection, err)| (connection, err.into()))
}

/// Error reported when close is requested while statements are outstanding.
pub(crate) fn close_refused(outstanding: usize) -> EngineError {
    EngineError::new(ffi::SQLITE_BUSY, format!("{CLOSE_REFUSED_MESSAGE} ({outstanding} open)"))
}

/// Reads the engine's current error message for `db`.
fn last_error(db: *mut ffi::sqlite3, code: c_int) -> EngineError {
    // SAFETY: `db` is a live handle owned by the calling worker.
    let message = unsafe { ffi::sqlite3_errmsg(db) };
    if message.is_null() {
        return EngineError::new(code, "unknown engine error");
    }
    // SAFETY: the engine returns a NUL-terminated string valid until the next call on `db`.
    let text = unsafe { CStr::from_ptr(message) };
    EngineError::new(code, text.to_string_lossy().into_owned())
}

// ============================================================================
// SECTION: Compiled Statements
// ============================================================================

/// Compiles the first statement in `sql`.
///
/// Returns `Ok(None)` when `sql` holds no statement (blank or comment only).
/// Trailing statements after the first are ignored.
pub(crate) fn prepare<'conn>(
    connection: &'conn EngineConnection,
    sql: &str,
) -> Result<Option<RawStatement<'conn>>, EngineError> {
    let Ok(len) = c_int::try_from(sql.len()) else {
        return Err(EngineError::new(ffi::SQLITE_TOOBIG, "statement text too long"));
    };
    // SAFETY: the handle is only used on this thread while `connection` is borrowed.
    let db = unsafe { connection.handle() };
    let mut statement = ptr::null_mut();
    let mut tail = ptr::null();
    // SAFETY: `sql` outlives the call and `len` bounds the read, so no NUL terminator is needed.
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            sql.as_ptr().cast::<c_char>(),
            len,
            &raw mut statement,
            &raw mut tail,
        )
    };
    if rc != ffi::SQLITE_OK {
        return Err(last_error(db, rc));
    }
    Ok(NonNull::new(statement).map(|handle| RawStatement {
        handle,
        db,
        _connection: PhantomData,
    }))
}

/// Compiled statement bound to the lifetime of its engine connection.
pub(crate) struct RawStatement<'conn> {
    /// Engine statement handle.
    handle: NonNull<ffi::sqlite3_stmt>,
    /// Owning engine handle, for error messages.
    db: *mut ffi::sqlite3,
    /// Ties the statement to the connection borrow.
    _connection: PhantomData<&'conn EngineConnection>,
}

impl RawStatement<'_> {
    /// Returns the raw statement pointer.
    const fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.handle.as_ptr()
    }

    /// Returns the number of positional parameters.
    pub(crate) fn parameter_count(&self) -> usize {
        // SAFETY: the statement is live until drop.
        let count = unsafe { ffi::sqlite3_bind_parameter_count(self.as_ptr()) };
        usize::try_from(count).unwrap_or(0)
    }

    /// Returns the number of result columns.
    fn column_count(&self) -> c_int {
        // SAFETY: the statement is live until drop.
        unsafe { ffi::sqlite3_column_count(self.as_ptr()) }
    }

    /// Rewinds the statement; bindings are kept.
    fn reset(&mut self) {
        // SAFETY: the statement is live until drop. The return code repeats the last step error.
        unsafe { ffi::sqlite3_reset(self.as_ptr()) };
    }

    /// Resets the statement and binds `values` to parameters 1..=N.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ArgCountMismatch`] when the value count differs
    /// from the parameter count (the statement is still reset), and
    /// [`BridgeError::WrongType`] or [`BridgeError::Engine`] when a value
    /// cannot be bound.
    pub(crate) fn bind_all(&mut self, values: &[Value]) -> Result<(), BridgeError> {
        let expected = self.parameter_count();
        self.reset();
        if values.len() != expected {
            return Err(BridgeError::ArgCountMismatch {
                expected,
                actual: values.len(),
            });
        }
        // SAFETY: the statement is live until drop.
        unsafe { ffi::sqlite3_clear_bindings(self.as_ptr()) };
        for (offset, value) in values.iter().enumerate() {
            let index = offset + 1;
            value.check_bindable().map_err(|reason| BridgeError::WrongType {
                index,
                reason,
            })?;
            let Ok(position) = c_int::try_from(index) else {
                return Err(BridgeError::WrongType {
                    index,
                    reason: "parameter index out of range".to_string(),
                });
            };
            let rc = self.bind_value(position, value);
            if rc != ffi::SQLITE_OK {
                return Err(BridgeError::Engine(last_error(self.db, rc)));
            }
        }
        Ok(())
    }

    /// Binds one value by its variant; lengths were checked by `check_bindable`.
    fn bind_value(&mut self, position: c_int, value: &Value) -> c_int {
        let statement = self.as_ptr();
        match value {
            // SAFETY: the statement is live and `position` is within the parameter count.
            Value::Integer(number) => unsafe { ffi::sqlite3_bind_int64(statement, position, *number) },
            // SAFETY: as above.
            Value::Float(number) => unsafe { ffi::sqlite3_bind_double(statement, position, *number) },
            Value::Text(text) => {
                let len = c_int::try_from(text.len()).unwrap_or(c_int::MAX);
                // SAFETY: TRANSIENT makes the engine copy `len` bytes before returning.
                unsafe {
                    ffi::sqlite3_bind_text(
                        statement,
                        position,
                        text.as_ptr().cast::<c_char>(),
                        len,
                        ffi::SQLITE_TRANSIENT(),
                    )
                }
            }
            Value::Blob(blob) => {
                let len = c_int::try_from(blob.len()).unwrap_or(c_int::MAX);
                // SAFETY: TRANSIENT makes the engine copy `len` bytes before returning.
                unsafe {
                    ffi::sqlite3_bind_blob(
                        statement,
                        position,
                        blob.as_ptr().cast::<c_void>(),
                        len,
                        ffi::SQLITE_TRANSIENT(),
                    )
                }
            }
            // SAFETY: the statement is live and `position` is within the parameter count.
            Value::Null => unsafe { ffi::sqlite3_bind_null(statement, position) },
        }
    }

    /// Advances the statement by one row.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnexpectedResult`] for any engine outcome other
    /// than row, done, or busy, and [`BridgeError::ResourceExhausted`] when
    /// the row cannot be materialized.
    pub(crate) fn step(&mut self) -> Result<StepResult, BridgeError> {
        // SAFETY: the statement is live until drop.
        let rc = unsafe { ffi::sqlite3_step(self.as_ptr()) };
        match rc {
            ffi::SQLITE_ROW => self.read_row().map(StepResult::Row),
            ffi::SQLITE_DONE => Ok(StepResult::Done),
            code if code & 0xff == ffi::SQLITE_BUSY => Ok(StepResult::Busy),
            code => Err(BridgeError::UnexpectedResult {
                code,
            }),
        }
    }

    /// Copies every column of the current row.
    fn read_row(&self) -> Result<Vec<Value>, BridgeError> {
        let count = self.column_count();
        let mut row = Vec::new();
        row.try_reserve_exact(usize::try_from(count).unwrap_or(0))
            .map_err(|_| BridgeError::ResourceExhausted("row buffer".to_string()))?;
        for column in 0 .. count {
            row.push(self.read_cell(column)?);
        }
        Ok(row)
    }

    /// Copies one column of the current row according to its storage class.
    fn read_cell(&self, column: c_int) -> Result<Value, BridgeError> {
        let statement = self.as_ptr();
        // SAFETY: the statement is positioned on a row and `column` is in range.
        let class = unsafe { ffi::sqlite3_column_type(statement, column) };
        let value = match class {
            // SAFETY: as above.
            ffi::SQLITE_INTEGER => Value::Integer(unsafe { ffi::sqlite3_column_int64(statement, column) }),
            // SAFETY: as above.
            ffi::SQLITE_FLOAT => Value::Float(unsafe { ffi::sqlite3_column_double(statement, column) }),
            ffi::SQLITE_TEXT => {
                // SAFETY: as above; the pointer is read before the byte count per engine rules.
                let data = unsafe { ffi::sqlite3_column_text(statement, column) };
                let bytes = self.copy_column(data.cast::<u8>(), column)?;
                Value::Text(
                    String::from_utf8(bytes)
                        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned()),
                )
            }
            ffi::SQLITE_BLOB => {
                // SAFETY: as above; the pointer is read before the byte count per engine rules.
                let data = unsafe { ffi::sqlite3_column_blob(statement, column) };
                Value::Blob(self.copy_column(data.cast::<u8>(), column)?)
            }
            _ => Value::Null,
        };
        Ok(value)
    }

    /// Copies the bytes behind a text or blob column pointer.
    fn copy_column(&self, data: *const u8, column: c_int) -> Result<Vec<u8>, BridgeError> {
        // SAFETY: the statement is positioned on a row and `column` is in range.
        let len = unsafe { ffi::sqlite3_column_bytes(self.as_ptr(), column) };
        let len = cell_len(data, len)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        // SAFETY: the engine guarantees `len` readable bytes until the next call on this statement.
        let source = unsafe { std::slice::from_raw_parts(data, len) };
        let mut owned = Vec::new();
        owned
            .try_reserve_exact(len)
            .map_err(|_| BridgeError::ResourceExhausted("column buffer".to_string()))?;
        owned.extend_from_slice(source);
        Ok(owned)
    }

    /// Returns the result column names in order.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ResourceExhausted`] when a name cannot be
    /// allocated.
    pub(crate) fn column_names(&self) -> Result<Vec<String>, BridgeError> {
        let count = self.column_count();
        let mut names = Vec::new();
        names
            .try_reserve_exact(usize::try_from(count).unwrap_or(0))
            .map_err(|_| BridgeError::ResourceExhausted("column names".to_string()))?;
        for column in 0 .. count {
            // SAFETY: the statement is live and `column` is in range.
            let name = unsafe { ffi::sqlite3_column_name(self.as_ptr(), column) };
            if name.is_null() {
                return Err(BridgeError::ResourceExhausted("column name".to_string()));
            }
            // SAFETY: the engine returns a NUL-terminated string valid until the statement changes.
            let name = unsafe { CStr::from_ptr(name) };
            names.push(name.to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

/// Validates a text or blob cell before copying.
///
/// A null pointer with a non-zero byte count means the engine failed to
/// allocate the converted value.
fn cell_len(data: *const u8, len: c_int) -> Result<usize, BridgeError> {
    let len = usize::try_from(len).unwrap_or(0);
    if len > 0 && data.is_null() {
        return Err(BridgeError::ResourceExhausted("column value".to_string()));
    }
    Ok(len)
}

impl Drop for RawStatement<'_> {
    fn drop(&mut self) {
        // SAFETY: the handle is finalized exactly once; the connection is still borrowed.
        unsafe { ffi::sqlite3_finalize(self.as_ptr()) };
    }
}
