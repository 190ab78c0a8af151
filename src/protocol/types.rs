//! RESP Wire Values
//!
//! This module defines the closed set of values that can appear on the wire.
//! Every value starts with a one-byte type tag and is terminated by CRLF
//! (`\r\n`); aggregates carry a length prefix followed by their elements.
//!
//! ## Type Tags
//!
//! - `+` Simple String
//! - `-` Simple Error
//! - `:` Integer
//! - `$` Bulk String (`$-1` is the legacy null)
//! - `*` Array (`*-1` is the legacy null array)
//! - `_` Null
//! - `#` Boolean
//! - `,` Double
//! - `%` Map
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command 'FOO'\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Array: `*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n`
//! Map: `%1\r\n$3\r\ndir\r\n$4\r\n/tmp\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used by every frame.
pub const CRLF: &[u8] = b"\r\n";

/// RESP type tag bytes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
    pub const NULL: u8 = b'_';
    pub const BOOLEAN: u8 = b'#';
    pub const DOUBLE: u8 = b',';
    pub const MAP: u8 = b'%';
}

/// A single protocol value.
///
/// Used both for decoded client requests and for replies handed to the
/// encoder. `Double` makes this type `PartialEq` only.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Non-binary-safe text. Must not contain CR or LF.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Error reply.
    /// Format: `-<message>\r\n`
    Error(String),

    /// 64-bit signed integer.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe, length-prefixed payload.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Ordered sequence of values, possibly nested.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<WireValue>),

    /// Absent value. Decoded from `_\r\n`, `$-1\r\n` or `*-1\r\n`;
    /// encoded as `$-1\r\n`.
    Null,

    /// Format: `#t\r\n` / `#f\r\n`
    Boolean(bool),

    /// Format: `,<float>\r\n`
    Double(f64),

    /// Ordered key/value pairs.
    /// Format: `%<pairs>\r\n<key1><value1>...`
    Map(Vec<(WireValue, WireValue)>),
}

impl WireValue {
    /// Creates a new simple string value.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::WireValue;
    /// let ok = WireValue::simple_string("OK");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        WireValue::SimpleString(s.into())
    }

    /// Creates a new error value.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::WireValue;
    /// let err = WireValue::error("ERR unknown command 'FOO'");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        WireValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        WireValue::Integer(n)
    }

    /// Creates a new bulk string value.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::WireValue;
    /// use bytes::Bytes;
    /// let bulk = WireValue::bulk_string(Bytes::from("hey"));
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        WireValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        WireValue::Null
    }

    pub fn array(values: Vec<WireValue>) -> Self {
        WireValue::Array(values)
    }

    pub fn map(pairs: Vec<(WireValue, WireValue)>) -> Self {
        WireValue::Map(pairs)
    }

    /// `+OK`
    pub fn ok() -> Self {
        WireValue::SimpleString("OK".to_string())
    }

    /// `+PONG`
    pub fn pong() -> Self {
        WireValue::SimpleString("PONG".to_string())
    }

    /// Returns a short name for the variant, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            WireValue::SimpleString(_) => "simple string",
            WireValue::Error(_) => "error",
            WireValue::Integer(_) => "integer",
            WireValue::BulkString(_) => "bulk string",
            WireValue::Array(_) => "array",
            WireValue::Null => "null",
            WireValue::Boolean(_) => "boolean",
            WireValue::Double(_) => "double",
            WireValue::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, WireValue::Error(_))
    }

    /// Attempts to extract the inner string from SimpleString or BulkString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::SimpleString(s) => Some(s),
            WireValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::SimpleString(s) => write!(f, "\"{}\"", s),
            WireValue::Error(s) => write!(f, "(error) {}", s),
            WireValue::Integer(n) => write!(f, "(integer) {}", n),
            WireValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            WireValue::Null => write!(f, "(nil)"),
            WireValue::Boolean(b) => write!(f, "({})", b),
            WireValue::Double(d) => write!(f, "(double) {}", d),
            WireValue::Array(values) => {
                if values.is_empty() {
                    return write!(f, "(empty array)");
                }
                for (i, v) in values.iter().enumerate() {
                    writeln!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
            WireValue::Map(pairs) => {
                if pairs.is_empty() {
                    return write!(f, "(empty map)");
                }
                for (i, (k, v)) in pairs.iter().enumerate() {
                    writeln!(f, "{}# {} => {}", i + 1, k, v)?;
                }
                Ok(())
            }
        }
    }
}
