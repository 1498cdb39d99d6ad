//! Command execution engine.
//!
//! Commands run through `sh` with the project root as working directory and
//! inherited stdio:
//! - inline commands: `sh -c <execute> <name> <args...>` so `$@` holds the args
//! - script modules: `sh <file> <args...>`

use super::module::{CommandDef, Execution};
use crate::restart::{RESTART_ENV, SUPERVISED_ENV};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const PROJECT_DIR_ENV: &str = "KILN_PROJECT_DIR";
pub const COMMAND_ENV: &str = "KILN_COMMAND";

/// Runs registered commands.
pub struct CommandExecutor {
    project_dir: PathBuf,
    home_dir: PathBuf,
}

impl CommandExecutor {
    pub fn new(project_dir: impl AsRef<Path>, home_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
            home_dir: home_dir.as_ref().to_path_buf(),
        }
    }

    /// Run `command` with `args` and return its exit code.
    pub async fn run(&self, command: &CommandDef, args: &[String]) -> Result<i32> {
        let mut child = Command::new("sh");
        match &command.execution {
            Execution::Inline(script) => {
                child.arg("-c").arg(script).arg(&command.name);
            }
            Execution::Script(path) => {
                child.arg(path);
            }
        }
        child
            .args(args)
            .current_dir(&self.project_dir)
            .env(PROJECT_DIR_ENV, &self.project_dir)
            .env(COMMAND_ENV, &command.name)
            .env(crate::home::HOME_ENV, &self.home_dir)
            // A nested `kiln` must go through its own wrapper.
            .env_remove(SUPERVISED_ENV)
            .env_remove(RESTART_ENV);

        tracing::debug!(command = %command.name, source = %command.source.display(), ?args, "running command");

        let status = child
            .status()
            .await
            .with_context(|| format!("Failed to spawn command '{}'", command.name))?;

        // Killed by a signal: report a generic failure.
        let code = status.code().unwrap_or(1);
        tracing::debug!(command = %command.name, code, "command finished");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn inline(name: &str, script: &str) -> CommandDef {
        CommandDef {
            name: name.to_string(),
            description: "test".to_string(),
            execution: Execution::Inline(script.to_string()),
            source: PathBuf::from("test.toml"),
        }
    }

    #[tokio::test]
    async fn test_inline_receives_args_env_and_cwd() {
        let dir = tempdir().unwrap();
        let home = dir.path().join("home");
        let out = dir.path().join("out.txt");
        let cmd = inline(
            "greet",
            &format!(
                r#"printf '%s|%s|%s|%s|%s|%s|%s|%s\n' "$0" "$*" "$KILN_COMMAND" "$KILN_HOME" "$KILN_PROJECT_DIR" "$(pwd)" "${{KILN_SUPERVISED-unset}}" "${{KILN_RESTARTED-unset}}" > '{}'"#,
                out.display()
            ),
        );
        let executor = CommandExecutor::new(dir.path(), &home);
        let code = executor
            .run(&cmd, &["a".to_string(), "b c".to_string()])
            .await
            .unwrap();
        assert_eq!(code, 0);

        let line = std::fs::read_to_string(&out).unwrap();
        let parts: Vec<&str> = line.trim_end().split('|').collect();
        assert_eq!(parts[0], "greet");
        assert_eq!(parts[1], "a b c");
        assert_eq!(parts[2], "greet");
        assert_eq!(parts[3], home.display().to_string());
        assert_eq!(parts[4], dir.path().display().to_string());
        assert_eq!(
            Path::new(parts[5]).canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
        assert_eq!(parts[6], "unset");
        assert_eq!(parts[7], "unset");
    }

    #[tokio::test]
    async fn test_exit_code_is_returned() {
        let dir = tempdir().unwrap();
        let executor = CommandExecutor::new(dir.path(), dir.path());
        assert_eq!(executor.run(&inline("fail", "exit 3"), &[]).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_script_module_runs_file() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let script = dir.path().join("hello.sh");
        std::fs::write(
            &script,
            format!("# description: hi\necho \"script $1\" > '{}'\n", out.display()),
        )
        .unwrap();
        let cmd = CommandDef {
            name: "hello".into(),
            description: "hi".into(),
            execution: Execution::Script(script.clone()),
            source: script,
        };
        let executor = CommandExecutor::new(dir.path(), dir.path());
        assert_eq!(executor.run(&cmd, &["x".into()]).await.unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "script x\n");
    }

    #[tokio::test]
    async fn test_missing_project_dir_fails_to_spawn() {
        let dir = tempdir().unwrap();
        let executor = CommandExecutor::new(dir.path().join("missing"), dir.path());
        let err = executor.run(&inline("x", "true"), &[]).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn command 'x'"));
    }
}
