//! Typed Unpacking
//!
//! Converts a decoded [`WireValue`] into the native shape a caller expects.
//! A value whose shape does not match is rejected with
//! [`DecodeError::TypeMismatch`] instead of being coerced.
//!
//! ```
//! use respkv::protocol::{decode, unpack, WireValue};
//! use bytes::Bytes;
//!
//! let (frame, _) = decode(b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n").unwrap().unwrap();
//! let args: Vec<Bytes> = unpack(frame).unwrap();
//! assert_eq!(args, vec![Bytes::from("GET"), Bytes::from("key")]);
//! ```

use crate::protocol::decoder::{DecodeError, DecodeResult};
use crate::protocol::types::WireValue;
use bytes::Bytes;

/// A native type that can be extracted from a [`WireValue`].
pub trait FromWire: Sized {
    fn from_wire(value: WireValue) -> DecodeResult<Self>;
}

/// Converts `value` into `T`, failing on a shape mismatch.
pub fn unpack<T: FromWire>(value: WireValue) -> DecodeResult<T> {
    T::from_wire(value)
}

fn mismatch(expected: &'static str, found: &WireValue) -> DecodeError {
    DecodeError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

impl FromWire for Bytes {
    fn from_wire(value: WireValue) -> DecodeResult<Self> {
        match value {
            WireValue::BulkString(b) => Ok(b),
            WireValue::SimpleString(s) => Ok(Bytes::from(s)),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromWire for String {
    fn from_wire(value: WireValue) -> DecodeResult<Self> {
        match value {
            WireValue::SimpleString(s) => Ok(s),
            WireValue::BulkString(b) => String::from_utf8(b.to_vec())
                .map_err(|e| DecodeError::InvalidUtf8(e.to_string())),
            other => Err(mismatch("string", &other)),
        }
    }
}

/// Integers also accept their decimal text form, since clients send
/// numeric arguments as bulk strings.
impl FromWire for i64 {
    fn from_wire(value: WireValue) -> DecodeResult<Self> {
        match value {
            WireValue::Integer(n) => Ok(n),
            WireValue::BulkString(_) | WireValue::SimpleString(_) => {
                let text = String::from_wire(value)?;
                text.parse()
                    .map_err(|_| DecodeError::InvalidInteger(text))
            }
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl<T: FromWire> FromWire for Vec<T> {
    fn from_wire(value: WireValue) -> DecodeResult<Self> {
        match value {
            WireValue::Array(items) => items.into_iter().map(T::from_wire).collect(),
            other => Err(mismatch("array", &other)),
        }
    }
}
