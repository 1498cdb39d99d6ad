//! Command module files.
//!
//! A module is a file that defines one or more commands:
//!
//! - `*.toml` with a `[commands.<name>]` table per command, or top-level
//!   `description`/`execute` keys for a single command named after the file
//! - `*.sh` or an extensionless file: one command named after the file,
//!   described by a `# description:` comment line

use crate::errors::KilnError;
use std::path::{Path, PathBuf};

const DESCRIPTION_MARKER: &str = "# description:";

/// How a command is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// `sh -c <script> <name> <args...>`
    Inline(String),
    /// `sh <file> <args...>`
    Script(PathBuf),
}

/// A command contributed by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDef {
    pub name: String,
    pub description: String,
    pub execution: Execution,
    /// Module file the command came from.
    pub source: PathBuf,
}

/// Load every command defined by the module at `path`.
pub fn load_module(path: &Path) -> Result<Vec<CommandDef>, KilnError> {
    let content = std::fs::read_to_string(path).map_err(|e| KilnError::io(path, e))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => parse_toml_module(path, &content),
        _ => parse_script_module(path, &content).map(|cmd| vec![cmd]),
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> KilnError {
    KilnError::InvalidModule {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn file_stem(path: &Path) -> Result<String, KilnError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| invalid(path, "file name is not valid UTF-8"))
}

fn check_name(path: &Path, name: &str) -> Result<(), KilnError> {
    if name.is_empty() || name.starts_with('-') || name.chars().any(char::is_whitespace) {
        return Err(invalid(
            path,
            format!("'{}' is not a usable command name", name),
        ));
    }
    Ok(())
}

fn parse_toml_module(path: &Path, content: &str) -> Result<Vec<CommandDef>, KilnError> {
    let table: toml::Table = content
        .parse()
        .map_err(|e: toml::de::Error| invalid(path, format!("not valid TOML: {}", e.to_string().trim())))?;

    if let Some(commands) = table.get("commands") {
        let commands = commands
            .as_table()
            .ok_or_else(|| invalid(path, "'commands' must be a table of command definitions"))?;
        if commands.is_empty() {
            return Err(invalid(path, "'commands' table is empty"));
        }
        return commands
            .iter()
            .map(|(name, def)| {
                let def = def
                    .as_table()
                    .ok_or_else(|| invalid(path, format!("commands.{} must be a table", name)))?;
                command_from_table(path, name, def)
            })
            .collect();
    }

    if table.contains_key("description") || table.contains_key("execute") {
        let name = file_stem(path)?;
        return command_from_table(path, &name, &table).map(|cmd| vec![cmd]);
    }

    Err(invalid(
        path,
        "defines no commands; expected [commands.<name>] tables or top-level description/execute",
    ))
}

fn command_from_table(path: &Path, name: &str, def: &toml::Table) -> Result<CommandDef, KilnError> {
    check_name(path, name)?;
    let description = match def.get("description") {
        Some(toml::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(toml::Value::String(_)) => {
            return Err(invalid(path, format!("command '{}' has an empty description", name)));
        }
        Some(_) => {
            return Err(invalid(path, format!("command '{}': description must be a string", name)));
        }
        None => return Err(invalid(path, format!("command '{}' has no description", name))),
    };
    let execute = match def.get("execute") {
        Some(toml::Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(invalid(path, format!("command '{}': execute must be a string", name)));
        }
        None => return Err(invalid(path, format!("command '{}' has no execute", name))),
    };

    Ok(CommandDef {
        name: name.to_string(),
        description,
        execution: Execution::Inline(execute),
        source: path.to_path_buf(),
    })
}

fn parse_script_module(path: &Path, content: &str) -> Result<CommandDef, KilnError> {
    let name = file_stem(path)?;
    check_name(path, &name)?;
    let description = content
        .lines()
        .find_map(|line| line.trim().strip_prefix(DESCRIPTION_MARKER))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| {
            invalid(
                path,
                format!("missing a '{} ...' comment line", DESCRIPTION_MARKER),
            )
        })?;

    Ok(CommandDef {
        name,
        description,
        execution: Execution::Script(path.to_path_buf()),
        source: path.to_path_buf(),
    })
}
