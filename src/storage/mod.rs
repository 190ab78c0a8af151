//! Storage Engine Module
//!
//! This module provides the in-memory key space and its expiry machinery.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │   Mutex ─┬─ HashMap<key, Entry { value, expires_at, gen }>  │
//! │          └─ BinaryHeap<(deadline, gen, key)>                │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Single lock**: every read, write and removal is serialized
//! - **Lazy Expiry**: expired keys are dropped when read
//! - **Active Expiry**: the sweeper drops keys at their deadline
//! - **Overwrite-safe**: a deadline never removes a newer `SET`
//!
//! ## Example
//!
//! ```
//! use respkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set(Bytes::from("color"), Bytes::from("blue"));
//! assert_eq!(engine.get(&Bytes::from("color")), Some(Bytes::from("blue")));
//!
//! engine.set_with_ttl(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Duration::from_secs(3600)
//! );
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine, StorageStats};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
