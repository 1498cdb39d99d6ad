//! CLI command implementations.
//!
//! | Module     | Commands handled                    |
//! |------------|-------------------------------------|
//! | `init`     | `Init`                              |
//! | `deps`     | `Deps list/sync/install/add`        |
//! | `config`   | `Config show/validate/init`         |
//! | `state`    | `State get/set/unset/list/clear`    |
//! | `commands` | `Commands`, external subcommands    |

pub mod commands;
pub mod config;
pub mod deps;
pub mod init;
pub mod state;

pub use commands::{cmd_commands, cmd_external};
pub use config::cmd_config;
pub use deps::cmd_deps;
pub use init::cmd_init;
pub use state::cmd_state;

use anyhow::Result;
use kiln::config::{CliOverrides, KilnConfig};
use std::path::PathBuf;

/// Per-invocation settings shared by every command.
pub struct Session {
    /// Project root (nearest ancestor with `.kiln/`, or the start directory)
    pub project_dir: PathBuf,
    pub overrides: CliOverrides,
    /// Set when this worker is the re-invocation after a restart request
    pub restarted: bool,
    /// Skip confirmation prompts
    pub yes: bool,
}

impl Session {
    pub fn config(&self) -> Result<KilnConfig> {
        KilnConfig::new(self.project_dir.clone(), &self.overrides)
    }
}
