//! Restart coordination after dependency installs.
//!
//! Newly installed modules only become loadable in a fresh process. The
//! worker therefore exits with `RESTART_EXIT_CODE` after an install that
//! changed the manifest, and the wrapper (`supervise`) re-invokes it once
//! with `KILN_RESTARTED=1`.
//!
//! Per-process state machine:
//!
//! ```text
//! sync() = false                      -> Continue
//! sync() = true,  not restarted       -> Restart   (exit 75)
//! sync() = true,  already restarted   -> ProtocolViolation (exit 70)
//! sync() = false, restarted, missing  -> ProtocolViolation (exit 70)
//! ```
//!
//! Nothing in this module terminates the process; callers map the returned
//! decision to an exit code.

use crate::config::ProjectDependencies;
use crate::deps::{DependencySpecifier, Installer, PackageManager, Synchronizer, parse_all_in};
use crate::errors::{KilnError, PROTOCOL_VIOLATION_EXIT_CODE, RESTART_EXIT_CODE};
use crate::home::SharedHome;
use std::ffi::OsString;
use std::path::Path;

/// Marker the wrapper sets on the re-invoked worker.
pub const RESTART_ENV: &str = "KILN_RESTARTED";

/// Marker the wrapper sets on every worker it spawns.
pub const SUPERVISED_ENV: &str = "KILN_SUPERVISED";

/// Outcome of dependency coordination for one process invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Proceed to module resolution.
    Continue,
    /// Exit now with `RESTART_EXIT_CODE`.
    Restart,
}

impl RestartDecision {
    pub fn exit_code(self) -> Option<i32> {
        match self {
            RestartDecision::Continue => None,
            RestartDecision::Restart => Some(RESTART_EXIT_CODE),
        }
    }
}

/// Whether an env marker value means "set".
pub fn marker_is_set(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

/// Run the synchronizer and turn its result into a restart decision.
///
/// Relative `file:` dependencies are resolved against `project_dir`.
pub async fn coordinate<P: PackageManager + ?Sized>(
    sync: &Synchronizer<'_, P>,
    deps: &ProjectDependencies,
    project_dir: &Path,
    already_restarted: bool,
) -> Result<RestartDecision, KilnError> {
    let specs: Vec<DependencySpecifier> = parse_all_in(&deps.dependencies, project_dir)?;
    let home = sync.installer().home().root().to_path_buf();

    let changed = sync.sync(&specs, deps.install_mode, deps.offline).await?;

    if changed {
        if already_restarted {
            tracing::error!(home = %home.display(), "dependencies changed again after a restart");
            return Err(KilnError::ProtocolViolation {
                message: "dependencies were installed after the process had already restarted once"
                    .to_string(),
                home,
            });
        }
        tracing::info!("dependencies changed; requesting restart");
        return Ok(RestartDecision::Restart);
    }

    if already_restarted {
        let still_missing: Vec<String> = sync
            .missing(&specs)
            .into_iter()
            .map(|d| d.to_string())
            .collect();
        if !still_missing.is_empty() {
            return Err(KilnError::ProtocolViolation {
                message: format!(
                    "still missing after restart: {}",
                    still_missing.join(", ")
                ),
                home,
            });
        }
    }

    Ok(RestartDecision::Continue)
}

/// Install declared dependencies; `Ok(true)` means the caller must exit with
/// `RESTART_EXIT_CODE` now.
pub async fn auto_install_dependencies<P: PackageManager + ?Sized>(
    deps: &ProjectDependencies,
    project_dir: &Path,
    home: &SharedHome,
    package_manager: &P,
    already_restarted: bool,
) -> Result<bool, KilnError> {
    let sync = Synchronizer::new(Installer::new(home, package_manager));
    let decision = coordinate(&sync, deps, project_dir, already_restarted).await?;
    Ok(decision == RestartDecision::Restart)
}

/// What the wrapper does after a worker exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperStep {
    /// Spawn the worker again with the restart marker set.
    Respawn,
    /// Exit the wrapper with this code.
    Exit(i32),
}

/// Decide the wrapper's next step. At most one respawn ever happens.
pub fn next_step(exit_code: i32, restarted: bool) -> WrapperStep {
    match (exit_code, restarted) {
        (RESTART_EXIT_CODE, false) => WrapperStep::Respawn,
        (RESTART_EXIT_CODE, true) => WrapperStep::Exit(PROTOCOL_VIOLATION_EXIT_CODE),
        (code, _) => WrapperStep::Exit(code),
    }
}

/// Run `program args...` as a supervised worker, re-invoking it once when it
/// asks for a restart. Returns the exit code the wrapper should exit with.
pub async fn supervise(
    program: &Path,
    args: &[OsString],
    already_restarted: bool,
) -> anyhow::Result<i32> {
    use anyhow::Context;

    let mut restarted = already_restarted;
    loop {
        let mut command = tokio::process::Command::new(program);
        command.args(args).env(SUPERVISED_ENV, "1");
        if restarted {
            command.env(RESTART_ENV, "1");
        }
        let status = command
            .status()
            .await
            .with_context(|| format!("Failed to spawn worker: {}", program.display()))?;
        let code = status.code().unwrap_or(1);

        match next_step(code, restarted) {
            WrapperStep::Respawn => {
                tracing::debug!("worker requested restart; re-invoking once");
                restarted = true;
            }
            WrapperStep::Exit(exit) => {
                if code == RESTART_EXIT_CODE {
                    tracing::error!(
                        "worker requested a second restart; refusing to loop. Inspect the shared home manually."
                    );
                }
                return Ok(exit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::InstallPolicy;
    use crate::deps::installer::testing::FakePackageManager;
    use tempfile::tempdir;

    fn deps(list: &[&str], mode: InstallPolicy) -> ProjectDependencies {
        ProjectDependencies {
            dependencies: list.iter().map(|s| s.to_string()).collect(),
            install_mode: mode,
            offline: false,
        }
    }

    #[tokio::test]
    async fn test_restart_then_continue_after_install() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path().join("home"));
        let pm = FakePackageManager::default();
        let config = deps(&["left-pad"], InstallPolicy::Auto);

        // First invocation installs and asks for a restart.
        assert!(auto_install_dependencies(&config, dir.path(), &home, &pm, false).await.unwrap());
        // The re-invoked process finds everything installed.
        assert!(!auto_install_dependencies(&config, dir.path(), &home, &pm, true).await.unwrap());
        assert_eq!(pm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_relative_file_dependency_resolves_against_project() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("proj");
        let shared = dir.path().join("shared-cmds");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::create_dir_all(&shared).unwrap();
        let home = SharedHome::new(dir.path().join("data").join("kiln"));
        // Runs inside the shared home, where `../shared-cmds` does not exist.
        let pm = crate::deps::CommandPackageManager::new(
            "sh",
            vec![
                "-c".into(),
                r#"p="${0#file:}"; test -d "$p" || { echo "missing $p" >&2; exit 1; }; printf '{"dependencies": {"shared-cmds": "%s"}}\n' "$0" > package.json"#.into(),
            ],
        );
        let config = deps(&["file:../shared-cmds"], InstallPolicy::Auto);

        assert!(
            auto_install_dependencies(&config, &project, &home, &pm, false)
                .await
                .unwrap()
        );
        let manifest = home.read_manifest();
        assert_eq!(
            manifest.dependencies.get("shared-cmds").map(String::as_str),
            Some(format!("file:{}", shared.display()).as_str())
        );
        // The anchored form matches the manifest entry, so the restarted
        // process continues.
        assert!(
            !auto_install_dependencies(&config, &project, &home, &pm, true)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_restarted_process_that_installs_again_is_a_violation() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        let pm = FakePackageManager::default();
        let config = deps(&["left-pad"], InstallPolicy::Auto);

        let err = auto_install_dependencies(&config, dir.path(), &home, &pm, true)
            .await
            .unwrap_err();
        assert!(matches!(err, KilnError::ProtocolViolation { .. }));
        assert_eq!(err.exit_code(), PROTOCOL_VIOLATION_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_restarted_process_with_dependency_still_missing_is_a_violation() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        // The tool "succeeds" but records nothing, so the dependency stays missing.
        let pm = FakePackageManager {
            inert: true,
            ..Default::default()
        };
        let config = deps(&["left-pad"], InstallPolicy::Auto);

        let err = auto_install_dependencies(&config, dir.path(), &home, &pm, true)
            .await
            .unwrap_err();
        match err {
            KilnError::ProtocolViolation { message, home: h } => {
                assert!(message.contains("left-pad"));
                assert_eq!(h, home.root());
            }
            other => panic!("Expected ProtocolViolation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nothing_declared_continues_even_when_restarted() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        let pm = FakePackageManager::default();
        let config = deps(&[], InstallPolicy::Auto);
        assert!(!auto_install_dependencies(&config, dir.path(), &home, &pm, false).await.unwrap());
        assert!(!auto_install_dependencies(&config, dir.path(), &home, &pm, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_manual_policy_error_propagates_unchanged() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        let pm = FakePackageManager::default();
        let config = deps(&["left-pad"], InstallPolicy::Manual);
        let err = auto_install_dependencies(&config, dir.path(), &home, &pm, false)
            .await
            .unwrap_err();
        assert!(matches!(err, KilnError::DependenciesMissing { .. }));
        assert_eq!(pm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_declared_specifier_is_user_error() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        let pm = FakePackageManager::default();
        let config = deps(&["Not Valid"], InstallPolicy::Auto);
        let err = auto_install_dependencies(&config, dir.path(), &home, &pm, false)
            .await
            .unwrap_err();
        assert!(matches!(err, KilnError::InvalidSpecifier { .. }));
    }

    #[test]
    fn test_decision_exit_codes() {
        assert_eq!(RestartDecision::Continue.exit_code(), None);
        assert_eq!(RestartDecision::Restart.exit_code(), Some(RESTART_EXIT_CODE));
    }

    #[test]
    fn test_next_step_allows_exactly_one_respawn() {
        assert_eq!(next_step(RESTART_EXIT_CODE, false), WrapperStep::Respawn);
        assert_eq!(
            next_step(RESTART_EXIT_CODE, true),
            WrapperStep::Exit(PROTOCOL_VIOLATION_EXIT_CODE)
        );
        assert_eq!(next_step(0, false), WrapperStep::Exit(0));
        assert_eq!(next_step(1, true), WrapperStep::Exit(1));
        assert_eq!(
            next_step(PROTOCOL_VIOLATION_EXIT_CODE, true),
            WrapperStep::Exit(PROTOCOL_VIOLATION_EXIT_CODE)
        );
    }

    #[test]
    fn test_marker_is_set() {
        assert!(marker_is_set(Some("1")));
        assert!(marker_is_set(Some("TRUE")));
        assert!(!marker_is_set(Some("0")));
        assert!(!marker_is_set(Some("")));
        assert!(!marker_is_set(None));
    }

    #[tokio::test]
    async fn test_supervise_respawns_once_with_marker() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("runs.log");
        // Exits 75 until it sees the restart marker, logging each run.
        let script = format!(
            r#"echo "run restarted=${{{env}:-0}}" >> '{log}'; if [ -z "${{{env}}}" ]; then exit {code}; fi; exit 0"#,
            env = RESTART_ENV,
            log = log.display(),
            code = RESTART_EXIT_CODE
        );
        let code = supervise(
            Path::new("sh"),
            &[OsString::from("-c"), OsString::from(script)],
            false,
        )
        .await
        .unwrap();
        assert_eq!(code, 0);
        let runs = std::fs::read_to_string(&log).unwrap();
        assert_eq!(runs.lines().collect::<Vec<_>>(), vec!["run restarted=0", "run restarted=1"]);
    }

    #[tokio::test]
    async fn test_supervise_never_respawns_twice() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("runs.log");
        let script = format!(
            "echo run >> '{}'; exit {}",
            log.display(),
            RESTART_EXIT_CODE
        );
        let code = supervise(
            Path::new("sh"),
            &[OsString::from("-c"), OsString::from(script)],
            false,
        )
        .await
        .unwrap();
        assert_eq!(code, PROTOCOL_VIOLATION_EXIT_CODE);
        assert_eq!(std::fs::read_to_string(&log).unwrap().lines().count(), 2);
    }
}
