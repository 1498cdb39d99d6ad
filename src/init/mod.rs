//! Initialization module for kiln projects.
//!
//! `kiln init` creates the `.kiln/` directory in a project:
//!
//! ```text
//! .kiln/
//! ├── kiln.toml        # Project configuration
//! ├── state.json       # Key/value state store
//! └── commands/        # Local command modules
//!     └── hello.toml   # Sample command (fresh projects only)
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// The name of the kiln project directory.
pub const KILN_DIR: &str = ".kiln";

/// Project configuration file inside `.kiln/`.
pub const CONFIG_FILE: &str = "kiln.toml";

/// State store file inside `.kiln/`.
pub const STATE_FILE: &str = "state.json";

/// Default local command module directory inside `.kiln/`.
pub const COMMANDS_DIR: &str = "commands";

const DEFAULT_CONFIG: &str = r#"# Dependencies installed into the shared kiln home.
#   "name" / "name@range", "file:../path", "git+https://host/repo.git#ref"
dependencies = []

# auto | manual | ask
install_mode = "auto"

[modules]
# Extra module specifiers: "./local-file" or "package/sub/path"
specifiers = []
dir = "commands"
discover = true
"#;

const SAMPLE_COMMAND: &str = r#"[commands.hello]
description = "Print a greeting"
execute = "echo \"hello from $KILN_COMMAND\" \"$@\""
"#;

/// Result of initializing a kiln project.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the `.kiln` directory
    pub kiln_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Initialize a kiln project in `project_dir`.
///
/// Re-running on an existing project only fills in missing pieces; existing
/// files are never overwritten.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let kiln_dir = get_kiln_dir(project_dir);
    let created = !kiln_dir.exists();

    let commands_dir = kiln_dir.join(COMMANDS_DIR);
    std::fs::create_dir_all(&commands_dir).with_context(|| {
        format!(
            "Failed to create commands directory: {}",
            commands_dir.display()
        )
    })?;

    write_default_config(&kiln_dir)?;
    write_if_missing(&kiln_dir.join(STATE_FILE), "{}\n")?;
    if created {
        write_if_missing(&commands_dir.join("hello.toml"), SAMPLE_COMMAND)?;
    }

    tracing::debug!(kiln_dir = %kiln_dir.display(), created, "initialized project");
    Ok(InitResult { kiln_dir, created })
}

/// Write the commented default `kiln.toml` unless one exists.
/// Returns whether the file was written.
pub fn write_default_config(kiln_dir: &Path) -> Result<bool> {
    std::fs::create_dir_all(kiln_dir)
        .with_context(|| format!("Failed to create directory: {}", kiln_dir.display()))?;
    write_if_missing(&kiln_dir.join(CONFIG_FILE), DEFAULT_CONFIG)
}

fn write_if_missing(path: &Path, content: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, content).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(true)
}

/// Check if a project is already initialized with kiln.
pub fn is_initialized(project_dir: &Path) -> bool {
    get_kiln_dir(project_dir).is_dir()
}

/// Get the path to the kiln directory for a project.
pub fn get_kiln_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(KILN_DIR)
}

/// Walk up from `start` to the nearest directory containing `.kiln/`.
///
/// Falls back to `start` itself when no ancestor is a kiln project, so
/// built-in commands still work outside a project.
pub fn find_project_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| is_initialized(dir))
        .unwrap_or(start)
        .to_path_buf()
}
