//! Reconcile declared dependencies against the shared home.

use super::installer::{Installer, PackageManager};
use super::specifier::DependencySpecifier;
use crate::errors::{KilnError, MissingReason};
use serde::{Deserialize, Serialize};

/// Command users run to install missing dependencies by hand.
pub const INSTALL_COMMAND: &str = "kiln deps install";

/// What to do with declared dependencies that are not installed.
///
/// | Policy   | Behavior                                             |
/// |----------|------------------------------------------------------|
/// | `Auto`   | Install silently (default)                           |
/// | `Manual` | Fail, naming every missing dependency                |
/// | `Ask`    | No interactive channel exists yet; behaves as `Auto` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallPolicy {
    #[default]
    Auto,
    Manual,
    Ask,
}

impl std::fmt::Display for InstallPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallPolicy::Auto => write!(f, "auto"),
            InstallPolicy::Manual => write!(f, "manual"),
            InstallPolicy::Ask => write!(f, "ask"),
        }
    }
}

impl std::str::FromStr for InstallPolicy {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(InstallPolicy::Auto),
            "manual" => Ok(InstallPolicy::Manual),
            "ask" => Ok(InstallPolicy::Ask),
            _ => Err(KilnError::user_config(format!(
                "Invalid install mode '{}'. Valid values: auto, manual, ask",
                s
            ))),
        }
    }
}

/// Drives the installer according to an install policy.
pub struct Synchronizer<'a, P: PackageManager + ?Sized> {
    installer: Installer<'a, P>,
}

impl<'a, P: PackageManager + ?Sized> Synchronizer<'a, P> {
    pub fn new(installer: Installer<'a, P>) -> Self {
        Self { installer }
    }

    pub fn installer(&self) -> &Installer<'a, P> {
        &self.installer
    }

    /// Declared dependencies the shared home does not have, in declared order.
    pub fn missing<'d>(&self, deps: &'d [DependencySpecifier]) -> Vec<&'d DependencySpecifier> {
        deps.iter()
            .filter(|d| !self.installer.home().is_installed(d))
            .collect()
    }

    /// Bring the shared home in line with `deps`.
    ///
    /// Returns `Ok(true)` when at least one install changed the manifest,
    /// meaning the process must restart before it can load the new modules.
    pub async fn sync(
        &self,
        deps: &[DependencySpecifier],
        policy: InstallPolicy,
        offline: bool,
    ) -> Result<bool, KilnError> {
        self.installer.home().ensure_home()?;

        let missing = self.missing(deps);
        if missing.is_empty() {
            tracing::debug!(declared = deps.len(), "all dependencies installed");
            return Ok(false);
        }

        let names: Vec<String> = missing.iter().map(|d| d.to_string()).collect();
        tracing::info!(missing = ?names, policy = %policy, offline, "missing dependencies");

        if offline {
            return Err(KilnError::DependenciesMissing {
                missing: names,
                reason: MissingReason::Offline,
                remediation: format!("KILN_OFFLINE=0 {}", INSTALL_COMMAND),
            });
        }

        match policy {
            InstallPolicy::Manual => {
                return Err(KilnError::DependenciesMissing {
                    missing: names,
                    reason: MissingReason::Manual,
                    remediation: INSTALL_COMMAND.to_string(),
                });
            }
            InstallPolicy::Ask => {
                tracing::debug!("interactive confirmation is not available; installing as 'auto'");
            }
            InstallPolicy::Auto => {}
        }

        let mut any_changed = false;
        for spec in missing {
            let changed =
                self.installer
                    .install(spec)
                    .await
                    .map_err(|e| KilnError::InstallFailed {
                        spec: spec.to_string(),
                        remediation: self.installer.remediation(spec),
                        source: Box::new(e),
                    })?;
            any_changed = any_changed || changed;
        }

        Ok(any_changed)
    }
}
