//! Command Module
//!
//! Receives decoded commands, runs them against the store and builds replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Decoder   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandExecutor │  (this module)
//! │                 │
//! │  - Validate     │
//! │  - Dispatch     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `ECHO`, `GET`, `SET` (with the `PX` option)

pub mod handler;

pub use handler::{CommandError, CommandExecutor, CommandResult};
