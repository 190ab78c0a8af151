//! Command Handler Module
//!
//! This module implements the command processing layer. It receives decoded
//! request frames, executes them against the storage engine, and returns
//! the reply to send back.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │    Decoder      │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ CommandHandler  │────>│  CommandTable   │  (registry)
//! │                 │     │  + CONFIG table │
//! │  - Unpack       │     └─────────────────┘
//! │  - Dispatch     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `HELLO`, `ECHO`
//! - `SET key [value] [PX milliseconds]`, `GET key`
//! - `CONFIG GET parameter [parameter ...]`
//! - `COMMAND DOCS` (replies nothing and closes the connection)

pub mod handler;
pub mod registry;

use crate::protocol::WireValue;
use thiserror::Error;

pub use handler::CommandHandler;
pub use registry::{CommandFn, CommandTable};

/// Errors a command can fail with. All of them are sent to the client as
/// an error reply; none of them ends the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR {0}")]
    BadArguments(String),

    #[error("ERR {0}")]
    Internal(String),
}

impl DispatchError {
    pub(crate) fn wrong_arity(command: &str) -> Self {
        DispatchError::BadArguments(format!(
            "wrong number of arguments for '{}' command",
            command
        ))
    }

    /// Renders the error as a wire reply.
    ///
    /// Client-supplied text can carry CR or LF; both become spaces so the
    /// reply stays a single line.
    pub fn to_reply(&self) -> WireValue {
        WireValue::error(self.to_string().replace(['\r', '\n'], " "))
    }
}

/// What the connection should do after a command runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Send this value
    Reply(WireValue),

    /// Send nothing and keep serving
    Silent,

    /// Send nothing and close the connection
    Close,
}

impl From<WireValue> for Outcome {
    fn from(value: WireValue) -> Self {
        Outcome::Reply(value)
    }
}

pub type CommandResult = Result<Outcome, DispatchError>;
