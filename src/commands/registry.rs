//! Command Registry
//!
//! Maps lower-cased command names to handler functions. The tables are
//! built once on first use and are read-only afterwards, so every
//! connection shares them without locking.

use crate::commands::handler::CommandHandler;
use crate::commands::CommandResult;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::OnceLock;

/// A command implementation. `args` excludes the command name itself.
pub type CommandFn = fn(&CommandHandler, &[Bytes]) -> CommandResult;

/// A case-insensitive name → handler table.
#[derive(Default, Clone)]
pub struct CommandTable {
    commands: HashMap<String, CommandFn>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, handler: CommandFn) -> &mut Self {
        self.commands.insert(name.to_ascii_lowercase(), handler);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<CommandFn> {
        self.commands.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// The top-level command table.
pub fn builtin() -> &'static CommandTable {
    static TABLE: OnceLock<CommandTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = CommandTable::new();
        table
            .register("ping", CommandHandler::cmd_ping)
            .register("hello", CommandHandler::cmd_hello)
            .register("echo", CommandHandler::cmd_echo)
            .register("set", CommandHandler::cmd_set)
            .register("get", CommandHandler::cmd_get)
            .register("config", CommandHandler::cmd_config);
        table
    })
}

/// Subcommands of `CONFIG`.
pub fn config_subcommands() -> &'static CommandTable {
    static TABLE: OnceLock<CommandTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = CommandTable::new();
        table.register("get", CommandHandler::cmd_config_get);
        table
    })
}
