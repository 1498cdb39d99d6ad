//! Command registry: loads command modules and looks commands up by name.
//!
//! Modules come from two places, in this order:
//!
//! 1. `modules.specifiers` in `kiln.toml`, resolved via [`crate::resolver`]
//! 2. Discovery: every `*.toml` / `*.sh` file directly inside the local
//!    module root, when `modules.discover` is on
//!
//! The first command registered under a name wins. Names of built-in
//! subcommands are reserved.

pub mod executor;
pub mod module;

pub use executor::CommandExecutor;
pub use module::{CommandDef, Execution, load_module};

use crate::errors::KilnError;
use crate::home::SharedHome;
use crate::resolver::{MODULE_EXTENSIONS, resolve_module};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Subcommand names kiln handles itself.
pub const BUILTIN_COMMANDS: &[&str] = &["init", "deps", "config", "state", "commands", "help"];

/// Registered commands, keyed by name.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandDef>,
    /// One line per module or command that was skipped while loading.
    warnings: Vec<String>,
}

impl CommandRegistry {
    /// Resolve and load `specs` in order.
    ///
    /// With `strict`, the first module that fails to resolve or load aborts
    /// with its error. Otherwise it is logged and skipped.
    pub fn load(
        specs: &[String],
        local_root: &Path,
        home: &SharedHome,
        strict: bool,
    ) -> Result<Self, KilnError> {
        let mut registry = Self::default();
        let mut loaded_files: HashSet<PathBuf> = HashSet::new();

        for spec in specs {
            let commands = resolve_module(spec, local_root, home).and_then(|path| {
                if loaded_files.insert(path.clone()) {
                    load_module(&path)
                } else {
                    Ok(Vec::new())
                }
            });
            match commands {
                Ok(commands) => {
                    for command in commands {
                        registry.register(command);
                    }
                }
                Err(e) if strict => return Err(e),
                Err(e) => {
                    tracing::warn!(spec = %spec, error = %e, "skipping command module");
                    registry.warnings.push(format!("{}: {}", spec, e));
                }
            }
        }

        Ok(registry)
    }

    fn register(&mut self, command: CommandDef) {
        if BUILTIN_COMMANDS.contains(&command.name.as_str()) {
            tracing::warn!(name = %command.name, source = %command.source.display(), "command name is reserved by kiln");
            self.warnings.push(format!(
                "'{}' from {} shadows a built-in command and was ignored",
                command.name,
                command.source.display()
            ));
            return;
        }
        if let Some(existing) = self.commands.get(&command.name) {
            tracing::warn!(
                name = %command.name,
                kept = %existing.source.display(),
                ignored = %command.source.display(),
                "duplicate command"
            );
            self.warnings.push(format!(
                "'{}' from {} duplicates the one from {} and was ignored",
                command.name,
                command.source.display(),
                existing.source.display()
            ));
            return;
        }
        self.commands.insert(command.name.clone(), command);
    }

    pub fn get(&self, name: &str) -> Option<&CommandDef> {
        self.commands.get(name)
    }

    /// Look up `name`, or fail listing the available commands.
    pub fn require(&self, name: &str) -> Result<&CommandDef, KilnError> {
        self.get(name).ok_or_else(|| KilnError::CommandNotFound {
            name: name.to_string(),
            available: self.names(),
        })
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    /// Registered commands, sorted by name.
    pub fn commands(&self) -> impl Iterator<Item = &CommandDef> {
        self.commands.values()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Module files directly inside `local_root`, as `./<file-name>` specifiers
/// sorted by file name. A missing directory yields nothing.
pub fn discover(local_root: &Path) -> Vec<String> {
    WalkDir::new(local_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| MODULE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
        .map(|name| format!("./{}", name))
        .collect()
}

/// Declared specifiers followed by discovered ones, without duplicates.
pub fn module_specifiers(declared: &[String], local_root: &Path, discover_local: bool) -> Vec<String> {
    let mut specs: Vec<String> = Vec::new();
    let discovered = if discover_local {
        discover(local_root)
    } else {
        Vec::new()
    };
    for spec in declared.iter().cloned().chain(discovered) {
        if !specs.contains(&spec) {
            specs.push(spec);
        }
    }
    specs
}
