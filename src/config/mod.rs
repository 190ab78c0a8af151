//! Configuration
//!
//! Two kinds of configuration live here:
//!
//! - [`ServerArgs`]: process flags parsed at startup
//! - [`ConfigSource`]: the parameter store `CONFIG GET` reads from

pub mod cli;
pub mod store;

pub use cli::ServerArgs;
pub use store::{parse_config, ConfigError, ConfigSource, FileConfig, StaticConfig};
