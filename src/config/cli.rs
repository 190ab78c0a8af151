//! Command-line arguments for the server binary.

use crate::storage::ExpiryConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// respkv - an in-memory key-value server speaking RESP
#[derive(Parser, Debug, Clone)]
#[command(name = "respkv")]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Configuration file served by CONFIG GET
    #[arg(short, long, default_value = "redis.conf")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Longest idle interval of the expiry sweeper, in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval_ms: u64,
}

impl ServerArgs {
    /// Returns the bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn expiry_config(&self) -> ExpiryConfig {
        ExpiryConfig {
            max_interval: Duration::from_millis(self.sweep_interval_ms),
            ..ExpiryConfig::default()
        }
    }
}
