//! Configuration Store
//!
//! `CONFIG GET` reads server parameters through [`ConfigSource`]. The
//! default source is a flat text file read on demand, so edits to the file
//! are visible to the next `CONFIG GET` without a restart.
//!
//! ## File Format
//!
//! ```text
//! # comment lines start with '#'
//! dir /var/lib/respkv
//! dbfilename dump.rdb
//! ```
//!
//! One `key value` pair per line. The value is everything after the first
//! run of whitespace. Blank lines and lines with a key but no value are
//! skipped. A key that appears twice takes its last value.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;

/// Errors produced while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration source exists (e.g. the file is missing)
    #[error("configuration source not available")]
    NotAvailable,

    /// The source exists but could not be read
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
}

/// A read-only key/value configuration collaborator.
pub trait ConfigSource: Send + Sync {
    /// Reads every configured parameter.
    fn read_all(&self) -> Result<HashMap<String, String>, ConfigError>;

    /// Looks up a single parameter.
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.read_all()?.remove(key))
    }
}

/// Configuration backed by a `key value` text file.
#[derive(Debug, Clone)]
pub struct FileConfig {
    path: PathBuf,
}

impl FileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfig {
    fn read_all(&self) -> Result<HashMap<String, String>, ConfigError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotAvailable)
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let entries = parse_config(&contents);
        trace!(path = %self.path.display(), entries = entries.len(), "Read configuration file");
        Ok(entries)
    }
}

/// Parses the `key value` line format.
pub fn parse_config(contents: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();

    for line in contents.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, rest)) = line.split_once(char::is_whitespace) else {
            continue;
        };

        let value = rest.trim();
        if value.is_empty() {
            continue;
        }

        entries.insert(key.to_string(), value.to_string());
    }

    entries
}

/// In-memory configuration, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    entries: HashMap<String, String>,
}

impl StaticConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any previous value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigSource for StaticConfig {
    fn read_all(&self) -> Result<HashMap<String, String>, ConfigError> {
        Ok(self.entries.clone())
    }

    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.entries.get(key).cloned())
    }
}
