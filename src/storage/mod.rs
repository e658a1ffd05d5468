//! Storage Module
//!
//! An in-memory string store with per-key expiry deadlines.
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │                Store                  │
//! │  ┌─────────────────────────────────┐  │
//! │  │ Mutex<HashMap<Bytes, Entry>>    │  │
//! │  └─────────────────────────────────┘  │
//! │   get() evicts expired entries        │
//! └───────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use lazykv::storage::Store;
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(Store::new());
//!
//! store.set_with_expiry(Bytes::from("foo"), Bytes::from("bar"), Duration::from_millis(100));
//! assert_eq!(store.get(b"foo"), Some(Bytes::from("bar")));
//! ```

pub mod engine;

pub use engine::{Store, StoreStats};
