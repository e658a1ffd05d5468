//! RESP Data Types
//!
//! This module defines the values exchanged over the wire and their encoder.
//!
//! ## Protocol Format
//!
//! Each value starts with a type prefix byte:
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array
//!
//! Lines are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-cannot convert foo to int\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n`
//! Null Bulk String: `$-1\r\n`

use bytes::Bytes;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single decoded or to-be-encoded protocol value.
///
/// Every variant carries only its own payload. The null bulk string is
/// `BulkString(None)`, which is how a cache miss is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Short status text without line terminators.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Diagnostic text. Decoding failures are represented with this variant.
    /// Format: `-<error message>\r\n`
    Error(String),

    /// 64-bit signed integers.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Length-prefixed payload, or the null bulk string when `None`.
    /// Format: `$<length>\r\n<data>\r\n` / `$-1\r\n`
    BulkString(Option<Bytes>),

    /// Zero or more nested values.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a simple string.
    ///
    /// # Example
    /// ```
    /// use lazykv::protocol::types::RespValue;
    /// assert_eq!(RespValue::simple_string("OK").encode(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates an error value.
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a present bulk string.
    ///
    /// # Example
    /// ```
    /// use lazykv::protocol::types::RespValue;
    /// use bytes::Bytes;
    /// let bulk = RespValue::bulk_string(Bytes::from("bar"));
    /// assert_eq!(bulk.encode(), b"$3\r\nbar\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    /// The null bulk string.
    pub fn null() -> Self {
        RespValue::BulkString(None)
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Encodes the value into its wire representation.
    ///
    /// Encoding never fails; it is the inverse of
    /// [`decode`](crate::protocol::parser::decode) for well-formed values.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encodes the value into an existing buffer.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(Some(data)) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(None) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.encode_into(buf);
                }
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Returns the payload of a string-bearing value.
    ///
    /// Only `SimpleString` and a present `BulkString` carry a string; errors,
    /// integers, arrays and the null bulk string do not.
    pub fn as_bytes(&self) -> Option<Bytes> {
        match self {
            RespValue::SimpleString(s) => Some(Bytes::from(s.clone())),
            RespValue::BulkString(Some(b)) => Some(b.clone()),
            _ => None,
        }
    }

    /// Like [`as_bytes`](Self::as_bytes), but requires valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(Some(b)) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}
