//! # respkv - An In-Memory Key-Value Server Speaking RESP
//!
//! respkv is a small Redis-compatible server: a RESP wire codec, a command
//! dispatcher and an in-memory key-value store with per-key expiry.
//!
//! ## Features
//!
//! - **RESP codec**: streaming decoder and total encoder, RESP2 plus the
//!   RESP3 null, boolean, double and map types
//! - **Single-lock store**: every read, write and expiry is serialized
//! - **Expiry**: `SET ... PX` keys vanish lazily on read and actively at
//!   their deadline, and an overwrite is never removed by an older deadline
//! - **Async I/O**: one Tokio task per client connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              respkv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │──> ConfigSource  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐   ┌──────────────────────────────┐  │
//! │                     │ Decoder /   │   │        StorageEngine         │  │
//! │                     │ Encoder     │   │  Mutex<map + deadline heap>  │  │
//! │                     └─────────────┘   └──────────────────────────────┘  │
//! │                                                      ▲                  │
//! │                                                      │                  │
//! │                               ┌──────────────────────┴───────────────┐  │
//! │                               │            ExpirySweeper             │  │
//! │                               │       (Background Tokio Task)        │  │
//! │                               └──────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use respkv::commands::CommandHandler;
//! use respkv::config::FileConfig;
//! use respkv::connection::{handle_connection, ConnectionStats};
//! use respkv::storage::{start_expiry_sweeper, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!     let config = Arc::new(FileConfig::new("redis.conf"));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let handler = CommandHandler::new(Arc::clone(&storage), config.clone());
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, handler, stats));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `HELLO`
//! - `ECHO message [message ...]`
//! - `SET key [value] [PX milliseconds]`
//! - `GET key`
//! - `CONFIG GET parameter [parameter ...]`
//! - `COMMAND DOCS` (closes the connection)
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value type, decoder, encoder and typed conversions
//! - [`storage`]: Thread-safe storage engine with expiry
//! - [`commands`]: Command registry and dispatcher
//! - [`config`]: CLI arguments and the `CONFIG GET` parameter source
//! - [`connection`]: Client connection management

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, DispatchError, Outcome};
pub use config::{ConfigSource, FileConfig, ServerArgs, StaticConfig};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{decode, encode, DecodeError, Decoder, WireValue};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port respkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host respkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of respkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
