//! RESP Protocol Implementation
//!
//! This module implements the wire codec: a closed value type, a streaming
//! decoder, an encoder, and typed conversions between wire values and the
//! native shapes the command layer works with.
//!
//! ## Modules
//!
//! - `types`: the `WireValue` enum
//! - `decoder`: incremental frame decoder and `DecodeError`
//! - `encoder`: `encode` plus the `ToWire` trait for native values
//! - `convert`: the `FromWire` trait for typed unpacking
//!
//! ## Example
//!
//! ```
//! use respkv::protocol::{decode, encode, WireValue};
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = decode(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let reply = encode(&WireValue::bulk_string("blue"));
//! assert_eq!(reply, &b"$4\r\nblue\r\n"[..]);
//! ```

pub mod convert;
pub mod decoder;
pub mod encoder;
pub mod types;

pub use convert::{unpack, FromWire};
pub use decoder::{decode, DecodeError, DecodeResult, Decoder};
pub use encoder::{encode, encode_into, encode_native, Pairs, ToWire};
pub use types::WireValue;
