//! # lazykv - A Small In-Memory Key-Value Server
//!
//! lazykv speaks a subset of the Redis Serialization Protocol (RESP) and keeps
//! string values in memory, each with an optional expiry deadline.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                             lazykv                              │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐      │
//! │  │ TCP Server  │───>│ Connection  │───>│ CommandExecutor │      │
//! │  │ (Listener)  │    │  Handler    │    └────────┬────────┘      │
//! │  └─────────────┘    └──────┬──────┘             │               │
//! │                            │                    ▼               │
//! │                     ┌──────▼──────┐    ┌─────────────────┐      │
//! │                     │ RESP codec  │    │      Store      │      │
//! │                     │ decode/     │    │  one Mutex over │      │
//! │                     │ encode      │    │  the whole map  │      │
//! │                     └─────────────┘    └─────────────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use lazykv::{CommandExecutor, Store};
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::new());
//! let executor = CommandExecutor::new(Arc::clone(&store));
//!
//! let reply = executor
//!     .handle(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
//!     .unwrap();
//! assert_eq!(reply, b"+OK\r\n");
//!
//! let reply = executor.handle(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n").unwrap();
//! assert_eq!(reply, b"$3\r\nbar\r\n");
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO message [message ...]`
//! - `GET key`
//! - `SET key value [PX milliseconds]`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP decoder and encoder
//! - [`storage`]: Thread-safe store with lazy expiry
//! - [`commands`]: Command validation and dispatch
//! - [`connection`]: Client connection loop
//! - [`config`]: Command-line and environment settings
//!
//! ## Lazy Expiry
//!
//! A key past its deadline is removed the next time it is read. Nothing sweeps
//! the map in the background, so expired keys that are never read again stay
//! resident (and counted by [`Store::len`]) until overwritten.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::{CommandError, CommandExecutor};
pub use config::Config;
pub use connection::{handle_connection, ConnectionLimits, ConnectionStats};
pub use protocol::{decode, ParseError, RespParser, RespValue};
pub use storage::{Store, StoreStats};

/// The default port lazykv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host lazykv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of lazykv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
