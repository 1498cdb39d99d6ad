//! Typed error hierarchy for kiln.
//!
//! `KilnError` covers the dependency, resolution and restart core. Every
//! variant renders a complete message: what failed, what was tried and which
//! command fixes it. The CLI layer decides how much of it to show.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code reserved for "dependencies changed, re-invoke me".
pub const RESTART_EXIT_CODE: i32 = 75;

/// Exit code for a restarted process that would need yet another restart.
pub const PROTOCOL_VIOLATION_EXIT_CODE: i32 = 70;

/// Why missing dependencies were not installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReason {
    /// `install_mode = "manual"`
    Manual,
    /// `offline = true`
    Offline,
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingReason::Manual => write!(f, "install mode is 'manual'"),
            MissingReason::Offline => write!(f, "offline mode is enabled"),
        }
    }
}

/// Coarse classification used by the CLI for exit codes and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    UserConfig,
    ExternalTool,
    NotFound,
    ProtocolViolation,
    Internal,
}

/// Errors from the kiln core.
#[derive(Debug, Error)]
pub enum KilnError {
    #[error("{message}")]
    UserConfig { message: String },

    #[error("Invalid dependency specifier '{spec}': {reason}")]
    InvalidSpecifier { spec: String, reason: String },

    #[error(
        "Missing dependencies ({reason}): {}\n  Run '{remediation}' to install them.",
        .missing.join(", ")
    )]
    DependenciesMissing {
        missing: Vec<String>,
        reason: MissingReason,
        remediation: String,
    },

    #[error("{tool} failed to add '{spec}' ({status}):\n{stderr}")]
    ExternalTool {
        tool: String,
        spec: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to install dependency '{spec}'. Try installing it manually:\n  {remediation}")]
    InstallFailed {
        spec: String,
        remediation: String,
        #[source]
        source: Box<KilnError>,
    },

    #[error(
        "Module '{spec}' not found. Searched:\n{}\n  {hint}",
        .searched.iter().map(|p| format!("  - {}", p.display())).collect::<Vec<_>>().join("\n")
    )]
    ModuleNotFound {
        spec: String,
        searched: Vec<PathBuf>,
        hint: String,
    },

    #[error("Unknown command '{name}'. Available commands: {}", .available.join(", "))]
    CommandNotFound { name: String, available: Vec<String> },

    #[error("Invalid command module {}: {reason}", .path.display())]
    InvalidModule { path: PathBuf, reason: String },

    #[error(
        "Restart protocol violation: {message}\n  Inspect the shared home manually: {}",
        .home.display()
    )]
    ProtocolViolation { message: String, home: PathBuf },

    #[error("State store error: {message}")]
    State { message: String },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KilnError {
    pub fn user_config(message: impl Into<String>) -> Self {
        KilnError::UserConfig {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KilnError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            KilnError::UserConfig { .. }
            | KilnError::InvalidSpecifier { .. }
            | KilnError::DependenciesMissing { .. }
            | KilnError::InvalidModule { .. } => ErrorCategory::UserConfig,
            KilnError::ExternalTool { .. } | KilnError::InstallFailed { .. } => {
                ErrorCategory::ExternalTool
            }
            KilnError::ModuleNotFound { .. } | KilnError::CommandNotFound { .. } => {
                ErrorCategory::NotFound
            }
            KilnError::ProtocolViolation { .. } => ErrorCategory::ProtocolViolation,
            KilnError::State { .. } | KilnError::Io { .. } => ErrorCategory::Internal,
        }
    }

    /// Process exit code for this error. Never equal to `RESTART_EXIT_CODE`.
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::ProtocolViolation => PROTOCOL_VIOLATION_EXIT_CODE,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_missing_names_every_spec_and_remediation() {
        let err = KilnError::DependenciesMissing {
            missing: vec!["left-pad".into(), "@scope/tool@^2".into()],
            reason: MissingReason::Manual,
            remediation: "kiln deps install".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("left-pad"));
        assert!(msg.contains("@scope/tool@^2"));
        assert!(msg.contains("kiln deps install"));
        assert!(msg.contains("manual"));
        assert_eq!(err.category(), ErrorCategory::UserConfig);
    }

    #[test]
    fn module_not_found_lists_every_searched_path() {
        let err = KilnError::ModuleNotFound {
            spec: "./nope".into(),
            searched: vec![
                PathBuf::from("/proj/.mods/nope"),
                PathBuf::from("/proj/.mods/nope.toml"),
            ],
            hint: "Check the path".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/proj/.mods/nope\n"));
        assert!(msg.contains("/proj/.mods/nope.toml"));
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn install_failed_keeps_external_tool_source() {
        let inner = KilnError::ExternalTool {
            tool: "npm".into(),
            spec: "left-pad".into(),
            status: "exit status: 1".into(),
            stderr: "E404 Not Found".into(),
        };
        let err = KilnError::InstallFailed {
            spec: "left-pad".into(),
            remediation: "cd /home && npm install --save left-pad".into(),
            source: Box::new(inner),
        };
        assert_eq!(err.category(), ErrorCategory::ExternalTool);
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("E404 Not Found"));
        assert!(source.to_string().contains("left-pad"));
    }

    #[test]
    fn protocol_violation_exit_code_is_distinct_from_restart() {
        let err = KilnError::ProtocolViolation {
            message: "still missing".into(),
            home: PathBuf::from("/home/u/.local/share/kiln"),
        };
        assert_eq!(err.exit_code(), PROTOCOL_VIOLATION_EXIT_CODE);
        assert_ne!(err.exit_code(), RESTART_EXIT_CODE);
        assert!(err.to_string().contains("/home/u/.local/share/kiln"));
    }

    #[test]
    fn ordinary_errors_exit_with_one() {
        let err = KilnError::user_config("bad");
        assert_eq!(err.exit_code(), 1);
        let err = KilnError::io("/x", std::io::Error::other("boom"));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.category(), ErrorCategory::Internal);
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&KilnError::State {
            message: "x".into(),
        });
    }
}
