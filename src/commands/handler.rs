//! Command Dispatcher
//!
//! Turns a decoded request frame into an [`Outcome`]. A request is an array
//! of strings whose first element names the command; the name is resolved
//! case-insensitively through the [`registry`](crate::commands::registry)
//! and the remaining elements are passed to the handler as raw bytes.
//!
//! ## Commands
//!
//! - `PING` - Replies `PONG`
//! - `HELLO` - Handshake stub, replies `Hello, world!`
//! - `ECHO message [message ...]` - Echoes one message, or an array of them
//! - `SET key [value] [PX milliseconds]` - Stores a value, optionally expiring
//! - `GET key` - Reads a value
//! - `CONFIG GET parameter [parameter ...]` - Reads server parameters
//!
//! `COMMAND DOCS` is intercepted before dispatch: clients send it to probe
//! capabilities, and the server answers by closing the connection.
//!
//! Failures never escape as errors: they are rendered as `-ERR ...` replies
//! and the connection keeps serving.

use crate::commands::registry::{builtin, config_subcommands};
use crate::commands::{CommandResult, DispatchError, Outcome};
use crate::config::{ConfigError, ConfigSource};
use crate::protocol::{unpack, ToWire, WireValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Executes requests against the shared store and configuration.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Parameters served by `CONFIG GET`
    config: Arc<dyn ConfigSource>,
}

impl CommandHandler {
    /// Creates a new command handler.
    pub fn new(storage: Arc<StorageEngine>, config: Arc<dyn ConfigSource>) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a request frame.
    ///
    /// # Arguments
    ///
    /// * `frame` - The decoded request (should be an array of strings)
    ///
    /// # Returns
    ///
    /// What to send back, or whether to close the connection.
    pub fn execute(&self, frame: WireValue) -> Outcome {
        let args: Vec<Bytes> = match unpack(frame) {
            Ok(args) => args,
            Err(e) => {
                debug!(error = %e, "Rejected request frame");
                return Outcome::Reply(e.to_reply());
            }
        };

        let Some((name, rest)) = args.split_first() else {
            return Outcome::Reply(WireValue::error("ERR empty command"));
        };

        if is_command_docs(name, rest) {
            debug!("COMMAND DOCS probe, closing connection");
            return Outcome::Close;
        }

        let name = String::from_utf8_lossy(name);
        trace!(command = %name, args = rest.len(), "Dispatching command");

        match self.dispatch(&name, rest) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(command = %name, error = %e, "Command failed");
                Outcome::Reply(e.to_reply())
            }
        }
    }

    /// Resolves `name` in the command table and runs it.
    pub fn dispatch(&self, name: &str, args: &[Bytes]) -> CommandResult {
        match builtin().lookup(name) {
            Some(command) => command(self, args),
            None => Err(DispatchError::UnknownCommand(name.to_string())),
        }
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING
    pub(crate) fn cmd_ping(&self, _args: &[Bytes]) -> CommandResult {
        Ok(WireValue::pong().into())
    }

    /// HELLO [anything]
    pub(crate) fn cmd_hello(&self, _args: &[Bytes]) -> CommandResult {
        Ok(WireValue::simple_string("Hello, world!").into())
    }

    /// ECHO message [message ...]
    pub(crate) fn cmd_echo(&self, args: &[Bytes]) -> CommandResult {
        Ok(match args {
            [] => Outcome::Silent,
            [message] => message.to_wire().into(),
            messages => messages.to_wire().into(),
        })
    }

    // ========================================================================
    // String Commands
    // ========================================================================

    /// SET key [value] [PX milliseconds]
    pub(crate) fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        let (key, value, ttl) = match args {
            [] => return Err(DispatchError::wrong_arity("set")),
            [key] => (key, Bytes::new(), None),
            [key, value] => (key, value.clone(), None),
            [key, value, option, millis] => {
                if !option.eq_ignore_ascii_case(b"px") {
                    return Err(DispatchError::BadArguments("syntax error".into()));
                }
                (key, value.clone(), Some(parse_millis(millis)?))
            }
            _ => return Err(DispatchError::BadArguments("syntax error".into())),
        };

        match ttl {
            Some(ttl) => self.storage.set_with_ttl(key.clone(), value, ttl),
            None => self.storage.set(key.clone(), value),
        };

        Ok(WireValue::ok().into())
    }

    /// GET key
    pub(crate) fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        let [key] = args else {
            return Err(DispatchError::wrong_arity("get"));
        };

        Ok(self.storage.get(key).to_wire().into())
    }

    // ========================================================================
    // Configuration Commands
    // ========================================================================

    /// CONFIG subcommand [arg ...]
    pub(crate) fn cmd_config(&self, args: &[Bytes]) -> CommandResult {
        let Some((sub, rest)) = args.split_first() else {
            return Err(DispatchError::wrong_arity("config"));
        };

        let sub = String::from_utf8_lossy(sub);
        match config_subcommands().lookup(&sub) {
            Some(command) => command(self, rest),
            None => Err(DispatchError::UnknownCommand(format!("CONFIG {}", sub))),
        }
    }

    /// CONFIG GET parameter [parameter ...]
    ///
    /// One parameter replies `[name, value]` or Null. Several parameters
    /// reply a flat array of the pairs that were found.
    pub(crate) fn cmd_config_get(&self, args: &[Bytes]) -> CommandResult {
        if args.is_empty() {
            return Err(DispatchError::wrong_arity("config|get"));
        }

        let available = match self.config.read_all() {
            Ok(entries) => entries,
            Err(ConfigError::NotAvailable) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "Configuration read failed");
                return Err(DispatchError::Internal(e.to_string()));
            }
        };

        let mut found: Vec<Bytes> = Vec::with_capacity(args.len() * 2);
        for key in args {
            let name = String::from_utf8_lossy(key);
            if let Some(value) = available.get(&*name) {
                found.push(key.clone());
                found.push(Bytes::from(value.clone()));
            }
        }

        if args.len() == 1 && found.is_empty() {
            return Ok(WireValue::null().into());
        }

        Ok(found.to_wire().into())
    }
}

/// Matches `COMMAND DOCS`, case-insensitively and with nothing after it.
fn is_command_docs(name: &Bytes, args: &[Bytes]) -> bool {
    name.eq_ignore_ascii_case(b"command")
        && matches!(args, [sub] if sub.eq_ignore_ascii_case(b"docs"))
}

fn parse_millis(raw: &Bytes) -> Result<Duration, DispatchError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .ok_or_else(|| {
            DispatchError::BadArguments("value is not an integer or out of range".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, StaticConfig};
    use crate::protocol::{decode, encode};

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        let config = StaticConfig::new()
            .with("dir", "/var/lib/respkv")
            .with("dbfilename", "dump.rdb");
        CommandHandler::new(storage, Arc::new(config))
    }

    fn make_command(args: &[&str]) -> WireValue {
        WireValue::Array(
            args.iter()
                .map(|s| WireValue::bulk_string(Bytes::from(s.to_string())))
                .collect(),
        )
    }

    fn reply(handler: &CommandHandler, args: &[&str]) -> WireValue {
        match handler.execute(make_command(args)) {
            Outcome::Reply(value) => value,
            other => panic!("expected a reply, got {:?}", other),
        }
    }

    fn assert_error(value: WireValue) {
        assert!(value.is_error(), "expected an error, got {:?}", value);
    }

    struct BrokenConfig;

    impl ConfigSource for BrokenConfig {
        fn read_all(&self) -> Result<HashMap<String, String>, ConfigError> {
            Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "permission denied",
            )))
        }
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        assert_eq!(reply(&handler, &["PING"]), WireValue::simple_string("PONG"));
        assert_eq!(reply(&handler, &["ping"]), WireValue::pong());
    }

    #[test]
    fn test_hello_ignores_arguments() {
        let handler = create_handler();

        assert_eq!(
            reply(&handler, &["HELLO"]),
            WireValue::simple_string("Hello, world!")
        );
        assert_eq!(
            reply(&handler, &["hello", "3", "AUTH", "x", "y"]),
            WireValue::simple_string("Hello, world!")
        );
    }

    #[test]
    fn test_echo() {
        let handler = create_handler();

        assert_eq!(encode(&reply(&handler, &["ECHO", "hey"])), &b"$3\r\nhey\r\n"[..]);
        assert_eq!(
            encode(&reply(&handler, &["ECHO", "a", "b"])),
            &b"*2\r\n$1\r\na\r\n$1\r\nb\r\n"[..]
        );
        assert_eq!(handler.execute(make_command(&["ECHO"])), Outcome::Silent);
    }

    #[test]
    fn test_decoded_echo_round_trip() {
        let handler = create_handler();

        let (frame, _) = decode(b"*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n").unwrap().unwrap();
        let Outcome::Reply(value) = handler.execute(frame) else {
            panic!("expected a reply");
        };
        assert_eq!(encode(&value), &b"$3\r\nhey\r\n"[..]);
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        assert_eq!(reply(&handler, &["SET", "key", "value"]), WireValue::ok());
        assert_eq!(
            reply(&handler, &["GET", "key"]),
            WireValue::bulk_string(Bytes::from("value"))
        );
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        let response = reply(&handler, &["GET", "nonexistent"]);
        assert_eq!(response, WireValue::null());
        assert_eq!(encode(&response), &b"$-1\r\n"[..]);
    }

    #[test]
    fn test_get_arity() {
        let handler = create_handler();

        assert_error(reply(&handler, &["GET"]));
        assert_error(reply(&handler, &["GET", "a", "b"]));
    }

    #[test]
    fn test_set_key_only_stores_empty_value() {
        let handler = create_handler();

        assert_eq!(reply(&handler, &["SET", "key"]), WireValue::ok());
        assert_eq!(reply(&handler, &["GET", "key"]), WireValue::bulk_string(""));
    }

    #[test]
    fn test_set_bad_arity() {
        let handler = create_handler();

        assert_error(reply(&handler, &["SET"]));
        assert_error(reply(&handler, &["SET", "k", "v", "px"]));
        assert_error(reply(&handler, &["SET", "k", "v", "PX", "100", "extra"]));
        assert_eq!(reply(&handler, &["GET", "k"]), WireValue::null());
    }

    #[test]
    fn test_set_bad_expiry() {
        let handler = create_handler();

        assert_error(reply(&handler, &["SET", "k", "v", "EX", "100"]));
        assert_error(reply(&handler, &["SET", "k", "v", "PX", "soon"]));
        assert_error(reply(&handler, &["SET", "k", "v", "PX", "-5"]));

        // A rejected SET leaves nothing behind.
        assert_eq!(reply(&handler, &["GET", "k"]), WireValue::null());
    }

    #[test]
    fn test_set_with_px() {
        let handler = create_handler();

        assert_eq!(reply(&handler, &["SET", "k", "v", "px", "30"]), WireValue::ok());
        assert_eq!(reply(&handler, &["GET", "k"]), WireValue::bulk_string("v"));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(reply(&handler, &["GET", "k"]), WireValue::null());
    }

    #[test]
    fn test_set_px_zero_expires_immediately() {
        let handler = create_handler();

        assert_eq!(reply(&handler, &["SET", "k", "v", "PX", "0"]), WireValue::ok());
        assert_eq!(reply(&handler, &["GET", "k"]), WireValue::null());
    }

    #[test]
    fn test_plain_set_clears_expiry() {
        let handler = create_handler();

        reply(&handler, &["SET", "k", "v1", "PX", "30"]);
        reply(&handler, &["SET", "k", "v2"]);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(handler.storage().expire_due(std::time::Instant::now()), 0);
        assert_eq!(reply(&handler, &["GET", "k"]), WireValue::bulk_string("v2"));
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        let response = reply(&handler, &["FOO"]);
        assert_eq!(response, WireValue::error("ERR unknown command 'FOO'"));

        // The handler keeps working afterwards.
        assert_eq!(reply(&handler, &["PING"]), WireValue::pong());
    }

    #[test]
    fn test_malformed_requests() {
        let handler = create_handler();

        assert_eq!(
            reply(&handler, &[]),
            WireValue::error("ERR empty command")
        );
        assert_eq!(
            handler.execute(WireValue::simple_string("PING")),
            Outcome::Reply(WireValue::error(
                "ERR protocol error: expected array, found simple string"
            ))
        );
        assert_error(match handler.execute(WireValue::array(vec![WireValue::integer(1)])) {
            Outcome::Reply(value) => value,
            other => panic!("expected a reply, got {:?}", other),
        });
    }

    #[test]
    fn test_command_docs_closes() {
        let handler = create_handler();

        assert_eq!(handler.execute(make_command(&["COMMAND", "DOCS"])), Outcome::Close);
        assert_eq!(handler.execute(make_command(&["command", "docs"])), Outcome::Close);

        // Anything else under COMMAND is just an unknown command.
        assert_eq!(
            reply(&handler, &["COMMAND"]),
            WireValue::error("ERR unknown command 'COMMAND'")
        );
        assert_error(reply(&handler, &["COMMAND", "DOCS", "GET"]));
    }

    #[test]
    fn test_config_get_single() {
        let handler = create_handler();

        assert_eq!(
            reply(&handler, &["CONFIG", "GET", "dir"]),
            WireValue::array(vec![
                WireValue::bulk_string("dir"),
                WireValue::bulk_string("/var/lib/respkv"),
            ])
        );
        assert_eq!(reply(&handler, &["config", "get", "maxmemory"]), WireValue::null());
    }

    #[test]
    fn test_config_get_multiple_omits_missing() {
        let handler = create_handler();

        assert_eq!(
            reply(&handler, &["CONFIG", "GET", "dir", "maxmemory"]),
            WireValue::array(vec![
                WireValue::bulk_string("dir"),
                WireValue::bulk_string("/var/lib/respkv"),
            ])
        );
        assert_eq!(
            reply(&handler, &["CONFIG", "GET", "dbfilename", "dir"]),
            WireValue::array(vec![
                WireValue::bulk_string("dbfilename"),
                WireValue::bulk_string("dump.rdb"),
                WireValue::bulk_string("dir"),
                WireValue::bulk_string("/var/lib/respkv"),
            ])
        );
        assert_eq!(
            reply(&handler, &["CONFIG", "GET", "a", "b"]),
            WireValue::array(vec![])
        );
    }

    #[test]
    fn test_config_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig::new(dir.path().join("redis.conf"));
        let handler = CommandHandler::new(Arc::new(StorageEngine::new()), Arc::new(config));

        assert_eq!(reply(&handler, &["CONFIG", "GET", "dir"]), WireValue::null());
        assert_eq!(
            reply(&handler, &["CONFIG", "GET", "dir", "port"]),
            WireValue::array(vec![])
        );
    }

    #[test]
    fn test_config_read_failure_is_internal() {
        let handler = CommandHandler::new(Arc::new(StorageEngine::new()), Arc::new(BrokenConfig));

        assert_eq!(
            handler.dispatch("CONFIG", &[Bytes::from("GET"), Bytes::from("dir")]),
            Err(DispatchError::Internal(
                "failed to read configuration: permission denied".into()
            ))
        );
    }

    #[test]
    fn test_config_bad_subcommand() {
        let handler = create_handler();

        assert_error(reply(&handler, &["CONFIG"]));
        assert_error(reply(&handler, &["CONFIG", "GET"]));
        assert_eq!(
            reply(&handler, &["CONFIG", "REWRITE"]),
            WireValue::error("ERR unknown command 'CONFIG REWRITE'")
        );
    }
}
