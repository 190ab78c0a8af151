//! RESP Encoder
//!
//! Serializes [`WireValue`]s into wire bytes. Encoding is total: every
//! value has exactly one byte representation.
//!
//! Native Rust values reach the wire through [`ToWire`], which picks the
//! variant from the type alone:
//!
//! | Native type | Variant |
//! |---|---|
//! | `i64`, `i32` | Integer |
//! | `f64` | Double |
//! | `bool` | Boolean |
//! | `str`, `String`, `Bytes` | BulkString |
//! | `[T]`, `Vec<T>` | Array |
//! | `Option<T>` | Null or `T` |
//! | `Pairs<K, V>`, `BTreeMap<K, V>` | Map |
//!
//! Strings are always bulk strings, map keys included, so every payload
//! stays binary-safe.

use crate::protocol::types::{prefix, WireValue, CRLF};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// Serializes a value into a fresh buffer.
pub fn encode(value: &WireValue) -> Bytes {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.freeze()
}

/// Serializes a value into an existing buffer.
pub fn encode_into(value: &WireValue, buf: &mut BytesMut) {
    match value {
        WireValue::SimpleString(s) => put_text_line(buf, prefix::SIMPLE_STRING, s),
        WireValue::Error(s) => put_text_line(buf, prefix::ERROR, s),
        WireValue::Integer(n) => put_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
        WireValue::BulkString(data) => {
            put_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
            buf.put_slice(data);
            buf.put_slice(CRLF);
        }
        WireValue::Array(values) => {
            put_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
            for value in values {
                encode_into(value, buf);
            }
        }
        WireValue::Null => put_line(buf, prefix::BULK_STRING, b"-1"),
        WireValue::Boolean(b) => put_line(buf, prefix::BOOLEAN, if *b { b"t" } else { b"f" }),
        WireValue::Double(d) => put_line(buf, prefix::DOUBLE, format_double(*d).as_bytes()),
        WireValue::Map(pairs) => {
            put_line(buf, prefix::MAP, pairs.len().to_string().as_bytes());
            for (key, value) in pairs {
                encode_into(key, buf);
                encode_into(value, buf);
            }
        }
    }
}

/// Serializes a native value.
pub fn encode_native<T: ToWire + ?Sized>(value: &T) -> Bytes {
    encode(&value.to_wire())
}

#[inline]
fn put_line(buf: &mut BytesMut, tag: u8, line: &[u8]) {
    buf.reserve(line.len() + 3);
    buf.put_u8(tag);
    buf.put_slice(line);
    buf.put_slice(CRLF);
}

/// Simple strings and errors cannot contain CR or LF; they are written as
/// spaces so one value is always one frame.
fn put_text_line(buf: &mut BytesMut, tag: u8, text: &str) {
    if !text.contains(['\r', '\n']) {
        return put_line(buf, tag, text.as_bytes());
    }

    buf.reserve(text.len() + 3);
    buf.put_u8(tag);
    for &b in text.as_bytes() {
        buf.put_u8(if b == b'\r' || b == b'\n' { b' ' } else { b });
    }
    buf.put_slice(CRLF);
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "nan".to_string()
    } else if d.is_infinite() {
        let text = if d > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else {
        d.to_string()
    }
}

/// A native value with a fixed wire representation.
pub trait ToWire {
    fn to_wire(&self) -> WireValue;
}

/// Ordered key/value pairs, encoded as a map in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pairs<K, V>(pub Vec<(K, V)>);

impl ToWire for WireValue {
    fn to_wire(&self) -> WireValue {
        self.clone()
    }
}

impl ToWire for i64 {
    fn to_wire(&self) -> WireValue {
        WireValue::Integer(*self)
    }
}

impl ToWire for i32 {
    fn to_wire(&self) -> WireValue {
        WireValue::Integer(i64::from(*self))
    }
}

impl ToWire for f64 {
    fn to_wire(&self) -> WireValue {
        WireValue::Double(*self)
    }
}

impl ToWire for bool {
    fn to_wire(&self) -> WireValue {
        WireValue::Boolean(*self)
    }
}

impl ToWire for str {
    fn to_wire(&self) -> WireValue {
        WireValue::BulkString(Bytes::copy_from_slice(self.as_bytes()))
    }
}

impl ToWire for String {
    fn to_wire(&self) -> WireValue {
        self.as_str().to_wire()
    }
}

impl ToWire for Bytes {
    fn to_wire(&self) -> WireValue {
        WireValue::BulkString(self.clone())
    }
}

impl<T: ToWire + ?Sized> ToWire for &T {
    fn to_wire(&self) -> WireValue {
        (**self).to_wire()
    }
}

impl<T: ToWire> ToWire for [T] {
    fn to_wire(&self) -> WireValue {
        WireValue::Array(self.iter().map(ToWire::to_wire).collect())
    }
}

impl<T: ToWire> ToWire for Vec<T> {
    fn to_wire(&self) -> WireValue {
        self.as_slice().to_wire()
    }
}

impl<T: ToWire> ToWire for Option<T> {
    fn to_wire(&self) -> WireValue {
        match self {
            Some(value) => value.to_wire(),
            None => WireValue::Null,
        }
    }
}

impl<K: ToWire, V: ToWire> ToWire for Pairs<K, V> {
    fn to_wire(&self) -> WireValue {
        WireValue::Map(
            self.0
                .iter()
                .map(|(k, v)| (k.to_wire(), v.to_wire()))
                .collect(),
        )
    }
}

impl<K: ToWire, V: ToWire> ToWire for BTreeMap<K, V> {
    fn to_wire(&self) -> WireValue {
        WireValue::Map(self.iter().map(|(k, v)| (k.to_wire(), v.to_wire())).collect())
    }
}
