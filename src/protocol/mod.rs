//! RESP Protocol Codec
//!
//! Decoding raw bytes into [`RespValue`] trees and encoding them back.
//!
//! ## Modules
//!
//! - `types`: The `RespValue` sum type and its encoder
//! - `parser`: The recursive decoder and the CRLF scanner it is built on
//!
//! ## Example
//!
//! ```
//! use lazykv::protocol::{decode, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
//! let (value, consumed) = decode(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let reply = RespValue::bulk_string(Bytes::from("bar"));
//! assert_eq!(reply.encode(), b"$3\r\nbar\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{decode, match_crlf, ParseError, ParseResult, RespParser};
pub use types::RespValue;
