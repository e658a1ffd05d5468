//! RESP Decoder
//!
//! Turns raw bytes into a [`RespValue`] tree plus the number of bytes consumed.
//!
//! ## How the Decoder Reports Results
//!
//! - `Ok(Some((value, consumed)))` - A value was decoded from the first `consumed` bytes.
//!   Malformed tokens (a non-numeric integer, a bad length prefix, an unknown
//!   type byte) still land here, as a [`RespValue::Error`] describing the problem.
//!   The malformed token is consumed so the caller can resume after it.
//! - `Ok(None)` - The frame is incomplete: a line terminator has not arrived yet.
//! - `Err(ParseError)` - The frame breaks a resource limit and cannot be represented
//!   as data (nesting too deep, bulk length too large).
//!
//! ## Bulk String Payloads
//!
//! When the declared length is followed by CRLF at exactly that offset, the payload
//! is those bytes, so payloads may themselves contain CRLF. When it is not, the
//! payload runs up to the next CRLF instead of failing; `$6\r\nhello\r\n`
//! decodes to `"hello"` and consumes 11 bytes.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Framing faults that cannot be expressed as an Error value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Arrays are nested deeper than the parser allows
    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    /// A bulk string declares a length above the allowed maximum
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Default maximum array nesting depth
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 32;

/// Upper bound on the capacity reserved up front for an array.
/// The declared count is untrusted, so larger arrays grow as elements arrive.
const MAX_PREALLOCATED_ELEMENTS: usize = 1024;

pub const ERR_INVALID_BULK_SIZE: &str = "invalid bulk string size";
pub const ERR_INVALID_ARRAY_SIZE: &str = "invalid array size";

/// A recursive RESP decoder with a bounded nesting depth.
///
/// # Example
///
/// ```
/// use lazykv::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b"+PING\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::simple_string("PING"));
/// assert_eq!(consumed, 7);
/// ```
#[derive(Debug)]
pub struct RespParser {
    /// Current array nesting depth
    depth: usize,
    max_depth: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a parser with the default nesting limit.
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_NESTING_DEPTH)
    }

    /// Creates a parser that accepts at most `max_depth` nested arrays.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
        }
    }

    /// Decodes one value from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some(&marker) = buf.first() else {
            return Ok(None);
        };

        match marker {
            prefix::SIMPLE_STRING => Ok(parse_line(buf, RespValue::SimpleString)),
            prefix::ERROR => Ok(parse_line(buf, RespValue::Error)),
            prefix::INTEGER => Ok(parse_integer(buf)),
            prefix::BULK_STRING => parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Ok(match_crlf(buf).map(|(_, end)| {
                let message = format!("unknown type prefix '{}'", other.escape_ascii());
                (RespValue::Error(message), end)
            })),
        }
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let Some((count_text, header_len)) = read_line(buf) else {
            return Ok(None);
        };

        let count = match parse_i64(count_text) {
            Some(n) if n >= 0 => n as usize,
            _ => {
                return Ok(Some((RespValue::error(ERR_INVALID_ARRAY_SIZE), header_len)));
            }
        };

        if self.depth >= self.max_depth {
            return Err(ParseError::NestingTooDeep(self.max_depth));
        }

        self.depth += 1;
        let result = self.parse_elements(buf, header_len, count);
        self.depth -= 1;
        result
    }

    fn parse_elements(
        &mut self,
        buf: &[u8],
        mut consumed: usize,
        count: usize,
    ) -> ParseResult<Option<(RespValue, usize)>> {
        let mut elements = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));

        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Parses `+<text>\r\n` or `-<text>\r\n`; the caller picks the variant.
///
/// Invalid UTF-8 is replaced with U+FFFD.
fn parse_line(buf: &[u8], make: fn(String) -> RespValue) -> Option<(RespValue, usize)> {
    let (text, consumed) = read_line(buf)?;
    let value = make(String::from_utf8_lossy(text).into_owned());
    Some((value, consumed))
}

/// Parses an integer: `:<integer>\r\n`
fn parse_integer(buf: &[u8]) -> Option<(RespValue, usize)> {
    let (text, consumed) = read_line(buf)?;
    let value = match parse_i64(text) {
        Some(n) => RespValue::Integer(n),
        None => RespValue::Error(format!(
            "cannot convert {} to int",
            String::from_utf8_lossy(text)
        )),
    };
    Some((value, consumed))
}

/// Parses a bulk string: `$<length>\r\n<data>\r\n`
fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    debug_assert!(buf[0] == prefix::BULK_STRING);

    let Some((length_text, header_len)) = read_line(buf) else {
        return Ok(None);
    };

    let length = match parse_i64(length_text) {
        Some(-1) => return Ok(Some((RespValue::null(), header_len))),
        Some(n) if n >= 0 => n as usize,
        _ => return Ok(Some((RespValue::error(ERR_INVALID_BULK_SIZE), header_len))),
    };

    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let body = &buf[header_len..];

    if body.len() >= length + 2 && &body[length..length + 2] == CRLF {
        let data = Bytes::copy_from_slice(&body[..length]);
        return Ok(Some((RespValue::bulk_string(data), header_len + length + 2)));
    }

    // Declared length disagrees with the terminator; read up to the next CRLF.
    Ok(match_crlf(body).map(|(cr, end)| {
        let data = Bytes::copy_from_slice(&body[..cr]);
        (RespValue::bulk_string(data), header_len + end)
    }))
}

/// Splits off the line following the type byte.
///
/// Returns the line content and the number of bytes up to and including its CRLF.
#[inline]
fn read_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    let (cr, end) = match_crlf(&buf[1..])?;
    Some((&buf[1..1 + cr], 1 + end))
}

#[inline]
fn parse_i64(text: &[u8]) -> Option<i64> {
    std::str::from_utf8(text).ok()?.parse().ok()
}

/// Locates the first CRLF in `buf`.
///
/// Returns the index of `\r` and the index just past `\n`, or `None` when the
/// buffer holds no complete line terminator yet.
#[inline]
pub fn match_crlf(buf: &[u8]) -> Option<(usize, usize)> {
    buf.windows(2)
        .position(|pair| pair == CRLF)
        .map(|cr| (cr, cr + 2))
}

/// Decodes a single value using a parser with the default nesting limit.
pub fn decode(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
