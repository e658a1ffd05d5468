//! Command Executor
//!
//! Turns a decoded command array into a store operation and a reply.
//!
//! ## Supported Commands
//!
//! - `PING` - Replies `PONG`, arguments are ignored
//! - `ECHO message [message ...]` - Replies the arguments joined by single spaces
//! - `GET key` - Replies the value, or the null bulk string on a miss
//! - `SET key value [PX milliseconds]` - Stores the value, optionally with a TTL
//!
//! Command names and the `PX` option are matched case-insensitively.
//!
//! ## Errors
//!
//! A decode failure arrives as a [`RespValue::Error`] and is returned to the
//! client as an ordinary reply. Everything else that is wrong with a command
//! (not an array, empty, unknown name, wrong arity, non-string arguments) is a
//! [`CommandError`]; the connection layer closes the connection on those.

use crate::protocol::{decode, ParseError, RespValue};
use crate::storage::Store;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Option of `SET` that attaches a TTL in milliseconds.
const PX_OPTION: &[u8] = b"PX";

/// Why a command could not be executed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("command must be sent as an array")]
    NotAnArray,

    #[error("command and arguments are empty")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{command}': got {got}, expected {expected}")]
    WrongArity {
        command: &'static str,
        got: usize,
        expected: &'static str,
    },

    /// A name or argument that should carry a string carries something else.
    #[error("{0} is not a string")]
    NotAString(&'static str),

    #[error("duration must be a number")]
    InvalidDuration,

    #[error("syntax error: option '{0}' requires a value")]
    MissingOptionValue(String),

    /// The input did not contain a complete frame.
    #[error("incomplete frame")]
    Incomplete,

    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),
}

/// Result type for command execution.
pub type CommandResult<T> = Result<T, CommandError>;

/// Executes commands against a shared [`Store`].
///
/// Cloning is cheap; every connection task gets its own clone bound to the
/// same store.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    store: Arc<Store>,
}

impl CommandExecutor {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Decodes the first frame of `raw`, executes it and returns the encoded reply.
    ///
    /// # Example
    ///
    /// ```
    /// use lazykv::commands::CommandExecutor;
    /// use lazykv::storage::Store;
    /// use std::sync::Arc;
    ///
    /// let executor = CommandExecutor::new(Arc::new(Store::new()));
    /// let reply = executor.handle(b"*1\r\n$4\r\nPING\r\n").unwrap();
    /// assert_eq!(reply, b"+PONG\r\n");
    /// ```
    pub fn handle(&self, raw: &[u8]) -> CommandResult<Vec<u8>> {
        let (command, _) = decode(raw)?.ok_or(CommandError::Incomplete)?;
        Ok(self.execute(command)?.encode())
    }

    /// Executes a decoded command and returns the reply value.
    pub fn execute(&self, command: RespValue) -> CommandResult<RespValue> {
        let args = match command {
            RespValue::Array(args) => args,
            // A decode failure is reported to the client as data.
            error @ RespValue::Error(_) => return Ok(error),
            _ => return Err(CommandError::NotAnArray),
        };

        if let Some(error) = args.iter().find(|arg| arg.is_error()) {
            return Ok(error.clone());
        }

        let (name, args) = args.split_first().ok_or(CommandError::Empty)?;
        let name = name
            .as_str()
            .ok_or(CommandError::NotAString("command name"))?
            .to_uppercase();

        debug!(command = %name, args = args.len(), "Executing command");

        self.dispatch(&name, args)
    }

    fn dispatch(&self, name: &str, args: &[RespValue]) -> CommandResult<RespValue> {
        match name {
            "PING" => Ok(RespValue::pong()),
            "ECHO" => cmd_echo(args),
            "GET" => self.cmd_get(args),
            "SET" => self.cmd_set(args),
            _ => Err(CommandError::UnknownCommand(name.to_string())),
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[RespValue]) -> CommandResult<RespValue> {
        let [key] = args else {
            return Err(CommandError::WrongArity {
                command: "GET",
                got: args.len(),
                expected: "1",
            });
        };
        let key = string_arg(key, "key")?;

        Ok(match self.store.get(&key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: &[RespValue]) -> CommandResult<RespValue> {
        let [key, value, options @ ..] = args else {
            return Err(CommandError::WrongArity {
                command: "SET",
                got: args.len(),
                expected: "at least 2",
            });
        };
        let key = string_arg(key, "key")?;
        let value = string_arg(value, "value")?;

        match parse_set_ttl(options)? {
            Some(ttl) => self.store.set_with_expiry(key, value, ttl),
            None => self.store.set(key, value),
        }

        Ok(RespValue::ok())
    }
}

/// ECHO message [message ...]
fn cmd_echo(args: &[RespValue]) -> CommandResult<RespValue> {
    if args.is_empty() {
        return Err(CommandError::WrongArity {
            command: "ECHO",
            got: 0,
            expected: "at least 1",
        });
    }

    let mut joined = BytesMut::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            joined.extend_from_slice(b" ");
        }
        joined.extend_from_slice(&string_arg(arg, "argument")?);
    }

    Ok(RespValue::bulk_string(joined.freeze()))
}

/// Reads the TTL from the options following `SET key value`.
///
/// Only the first option is examined. Options other than `PX` are ignored.
fn parse_set_ttl(options: &[RespValue]) -> CommandResult<Option<Duration>> {
    let Some(option) = options.first() else {
        return Ok(None);
    };
    let option = string_arg(option, "option")?;

    if !option.eq_ignore_ascii_case(PX_OPTION) {
        debug!(option = %String::from_utf8_lossy(&option), "Ignoring unsupported SET option");
        return Ok(None);
    }

    let millis = options
        .get(1)
        .ok_or_else(|| CommandError::MissingOptionValue(String::from_utf8_lossy(&option).into()))?
        .as_str()
        .ok_or(CommandError::InvalidDuration)?
        .parse::<i64>()
        .map_err(|_| CommandError::InvalidDuration)?;

    // Non-positive durations store an entry that is already expired.
    Ok(Some(Duration::from_millis(millis.max(0) as u64)))
}

fn string_arg(value: &RespValue, what: &'static str) -> CommandResult<Bytes> {
    value.as_bytes().ok_or(CommandError::NotAString(what))
}
