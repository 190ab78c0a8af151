//! Streaming RESP Decoder
//!
//! Turns bytes read from a socket into [`WireValue`]s, one frame at a time.
//! The decoder never assumes a read holds exactly one request: a buffer may
//! hold a partial frame, exactly one frame, or several pipelined frames.
//!
//! ## How the Decoder Works
//!
//! [`Decoder::decode`] returns either:
//! - `Ok(Some((value, consumed)))` - a complete frame, `consumed` bytes long
//! - `Ok(None)` - the frame is incomplete, read more bytes and retry
//! - `Err(DecodeError)` - the bytes can never form a valid frame
//!
//! The caller appends socket data to a buffer, decodes, and advances the
//! buffer by `consumed` bytes after each frame. [`Decoder::decode_frame`] is
//! the whole-buffer variant used when no more bytes will arrive: an
//! incomplete frame becomes an error there.

use crate::protocol::types::{prefix, WireValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// The input buffer is empty
    #[error("empty input")]
    Empty,

    /// The buffer ends before the frame does
    #[error("incomplete frame")]
    Incomplete,

    /// The first byte of a line is not a known type tag
    #[error("unknown type tag: {0:#04x}")]
    UnknownType(u8),

    /// A declared length or element count is not a valid integer
    #[error("invalid length: {0:?}")]
    BadLength(String),

    /// A bulk string payload does not match its declared length
    #[error("bulk string payload does not match declared length")]
    TruncatedBulk,

    /// Aggregates are nested deeper than the decoder allows
    #[error("maximum nesting depth exceeded: {0}")]
    TooDeep(usize),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid double: {0}")]
    InvalidDouble(String),

    #[error("invalid boolean: {0}")]
    InvalidBoolean(String),

    /// Invalid UTF-8 in a simple string, error or textual conversion
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Any other violation of the frame grammar
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A decoded value does not have the shape the caller asked for
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A bulk string exceeds the maximum allowed size
    #[error("bulk string too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

impl DecodeError {
    /// The error reply sent to a client whose request failed to decode.
    pub fn to_reply(&self) -> WireValue {
        WireValue::error(format!("ERR protocol error: {}", self))
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Maximum size for a single bulk string (512 MB)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Default maximum aggregate nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// Upper bound on capacity reserved up front for a declared aggregate.
const MAX_PREALLOC: usize = 1024;

/// A streaming RESP decoder.
///
/// # Example
///
/// ```
/// use respkv::protocol::{Decoder, WireValue};
///
/// let mut decoder = Decoder::new();
/// let (value, consumed) = decoder
///     .decode(b"*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n")
///     .unwrap()
///     .unwrap();
///
/// assert_eq!(consumed, 23);
/// assert_eq!(
///     value,
///     WireValue::array(vec![
///         WireValue::bulk_string("ECHO"),
///         WireValue::bulk_string("hey"),
///     ])
/// );
/// ```
#[derive(Debug)]
pub struct Decoder {
    max_depth: usize,
    /// Set when the last `decode` stopped inside a bulk payload.
    short_bulk: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_NESTING_DEPTH)
    }

    /// Creates a decoder that rejects aggregates nested deeper than `max_depth`.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            short_bulk: false,
        }
    }

    /// Attempts to decode one frame from the front of `buf`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully decoded a frame
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Malformed data
    pub fn decode(&mut self, buf: &[u8]) -> DecodeResult<Option<(WireValue, usize)>> {
        if buf.is_empty() {
            return Err(DecodeError::Empty);
        }
        self.short_bulk = false;
        self.decode_value(buf, 0)
    }

    /// Decodes one frame from a buffer that will not grow any further.
    ///
    /// A frame cut short inside a bulk payload is reported as
    /// [`DecodeError::TruncatedBulk`], any other short frame as
    /// [`DecodeError::Incomplete`].
    pub fn decode_frame(&mut self, buf: &[u8]) -> DecodeResult<(WireValue, usize)> {
        match self.decode(buf)? {
            Some(frame) => Ok(frame),
            None if self.short_bulk => Err(DecodeError::TruncatedBulk),
            None => Err(DecodeError::Incomplete),
        }
    }

    fn decode_value(&mut self, buf: &[u8], depth: usize) -> DecodeResult<Option<(WireValue, usize)>> {
        let Some(&tag) = buf.first() else {
            return Ok(None);
        };

        if !is_known_tag(tag) {
            return Err(DecodeError::UnknownType(tag));
        }

        let (line, header_len) = match read_line(buf) {
            Some(found) => found,
            None => return Ok(None),
        };

        let value = match tag {
            prefix::SIMPLE_STRING => WireValue::SimpleString(to_utf8(line)?),
            prefix::ERROR => WireValue::Error(to_utf8(line)?),
            prefix::INTEGER => WireValue::Integer(parse_integer(line)?),
            prefix::DOUBLE => WireValue::Double(parse_double(line)?),
            prefix::BOOLEAN => WireValue::Boolean(parse_boolean(line)?),
            prefix::NULL => {
                if !line.is_empty() {
                    return Err(DecodeError::Malformed(
                        "null carries no payload".to_string(),
                    ));
                }
                WireValue::Null
            }
            prefix::BULK_STRING => return self.decode_bulk(buf, line, header_len),
            prefix::ARRAY => return self.decode_array(buf, line, header_len, depth),
            prefix::MAP => return self.decode_map(buf, line, header_len, depth),
            other => return Err(DecodeError::UnknownType(other)),
        };

        Ok(Some((value, header_len)))
    }

    /// `$<length>\r\n<data>\r\n`
    fn decode_bulk(
        &mut self,
        buf: &[u8],
        line: &[u8],
        header_len: usize,
    ) -> DecodeResult<Option<(WireValue, usize)>> {
        let length = parse_length(line)?;

        if length == -1 {
            return Ok(Some((WireValue::Null, header_len)));
        }
        if length < 0 {
            return Err(DecodeError::BadLength(length.to_string()));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(DecodeError::TooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total = header_len + length + CRLF.len();
        if buf.len() < total {
            self.short_bulk = true;
            return Ok(None);
        }

        if &buf[header_len + length..total] != CRLF {
            return Err(DecodeError::TruncatedBulk);
        }

        let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
        Ok(Some((WireValue::BulkString(data), total)))
    }

    /// `*<count>\r\n<elements...>`
    fn decode_array(
        &mut self,
        buf: &[u8],
        line: &[u8],
        header_len: usize,
        depth: usize,
    ) -> DecodeResult<Option<(WireValue, usize)>> {
        let count = parse_length(line)?;

        if count == -1 {
            return Ok(Some((WireValue::Null, header_len)));
        }
        if count < 0 {
            return Err(DecodeError::BadLength(count.to_string()));
        }
        if depth >= self.max_depth {
            return Err(DecodeError::TooDeep(self.max_depth));
        }

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(MAX_PREALLOC));
        let mut consumed = header_len;

        for _ in 0..count {
            match self.decode_value(&buf[consumed..], depth + 1)? {
                Some((value, used)) => {
                    elements.push(value);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((WireValue::Array(elements), consumed)))
    }

    /// `%<pairs>\r\n<key1><value1>...`
    fn decode_map(
        &mut self,
        buf: &[u8],
        line: &[u8],
        header_len: usize,
        depth: usize,
    ) -> DecodeResult<Option<(WireValue, usize)>> {
        let count = parse_length(line)?;

        if count < 0 {
            return Err(DecodeError::BadLength(count.to_string()));
        }
        if depth >= self.max_depth {
            return Err(DecodeError::TooDeep(self.max_depth));
        }

        let count = count as usize;
        let mut pairs = Vec::with_capacity(count.min(MAX_PREALLOC));
        let mut consumed = header_len;

        for _ in 0..count {
            let Some((key, used)) = self.decode_value(&buf[consumed..], depth + 1)? else {
                return Ok(None);
            };
            consumed += used;

            let Some((value, used)) = self.decode_value(&buf[consumed..], depth + 1)? else {
                return Ok(None);
            };
            consumed += used;

            pairs.push((key, value));
        }

        Ok(Some((WireValue::Map(pairs), consumed)))
    }
}

fn is_known_tag(tag: u8) -> bool {
    matches!(
        tag,
        prefix::SIMPLE_STRING
            | prefix::ERROR
            | prefix::INTEGER
            | prefix::BULK_STRING
            | prefix::ARRAY
            | prefix::NULL
            | prefix::BOOLEAN
            | prefix::DOUBLE
            | prefix::MAP
    )
}

/// Splits off the first line after the tag byte.
///
/// Returns the line content and the number of bytes up to and including
/// its CRLF, or `None` if no CRLF has arrived yet.
fn read_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    let pos = find_crlf(&buf[1..])?;
    Some((&buf[1..1 + pos], 1 + pos + CRLF.len()))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

fn to_utf8(line: &[u8]) -> DecodeResult<String> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|e| DecodeError::InvalidUtf8(e.to_string()))
}

fn parse_length(line: &[u8]) -> DecodeResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| DecodeError::BadLength(String::from_utf8_lossy(line).into_owned()))
}

fn parse_integer(line: &[u8]) -> DecodeResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| DecodeError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

fn parse_double(line: &[u8]) -> DecodeResult<f64> {
    let invalid = || DecodeError::InvalidDouble(String::from_utf8_lossy(line).into_owned());
    let text = std::str::from_utf8(line).map_err(|_| invalid())?;

    match text {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        _ => text.parse::<f64>().map_err(|_| invalid()),
    }
}

fn parse_boolean(line: &[u8]) -> DecodeResult<bool> {
    match line {
        b"t" => Ok(true),
        b"f" => Ok(false),
        _ => Err(DecodeError::InvalidBoolean(
            String::from_utf8_lossy(line).into_owned(),
        )),
    }
}

/// Decodes a single frame from a fresh decoder.
pub fn decode(buf: &[u8]) -> DecodeResult<Option<(WireValue, usize)>> {
    Decoder::new().decode(buf)
}
