// crates/serialite/src/value.rs
// ============================================================================
// Module: Values
// Description: Tagged scalar used for bind parameters and result cells.
// Purpose: Make the engine storage class of every datum explicit.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A [`Value`] is produced by the caller for binding and by the worker when a
//! row is materialized. The variant alone decides how a value is bound; there
//! is no structural probing.
//!
//! Limitations:
//! - Floats are not guaranteed bit-exact across engine storage classes.
//! - Text is read back as bytes and decoded lossily as UTF-8.

// ============================================================================
// SECTION: Value
// ============================================================================

/// A value that can be bound to a statement parameter or read from a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),
    /// Double-precision float.
    Float(f64),
    /// Text.
    Text(String),
    /// Binary blob.
    Blob(Vec<u8>),
    /// SQL NULL.
    Null,
}

/// Engine storage class of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Integer class.
    Integer,
    /// Float class.
    Float,
    /// Text class.
    Text,
    /// Blob class.
    Blob,
    /// Null class.
    Null,
}

impl Value {
    /// Returns the storage class of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Blob(_) => ValueKind::Blob,
            Self::Null => ValueKind::Null,
        }
    }

    /// Returns true for SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the float payload, if any.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the blob payload, if any.
    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(value) => Some(value),
            _ => None,
        }
    }

    /// Checks that the value can be bound without ambiguity.
    ///
    /// Text with an interior NUL could be either text or a blob, so it is
    /// rejected; the caller must tag it as [`Value::Blob`].
    pub(crate) fn check_bindable(&self) -> Result<(), String> {
        match self {
            Self::Text(text) if text.as_bytes().contains(&0) => {
                Err("text contains a NUL byte; bind it as a blob".to_string())
            }
            Self::Text(text) if i32::try_from(text.len()).is_err() => {
                Err("text exceeds the engine length limit".to_string())
            }
            Self::Blob(blob) if i32::try_from(blob.len()).is_err() => {
                Err("blob exceeds the engine length limit".to_string())
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Conversions
// ============================================================================

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Blob(value.to_vec())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Builds a `Vec<Value>` from heterogeneous expressions.
///
/// Usage: `values![1_i64, "text", None::<i64>]`
#[macro_export]
macro_rules! values {
    ($($val:expr),* $(,)?) => {
        vec![$($crate::Value::from($val)),*]
    };
}
