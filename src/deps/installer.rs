//! Dependency installation through an external package manager.
//!
//! The package manager runs with the shared home as its working directory,
//! so it maintains `package.json` and `node_modules/` there. kiln never
//! edits the manifest itself; it only compares signatures before and after
//! the tool ran to learn whether anything changed.

use super::specifier::DependencySpecifier;
use crate::errors::KilnError;
use crate::home::SharedHome;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// External tool that adds one dependency to a shared home.
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Human-readable invocation prefix, used in remediation hints
    /// (e.g. `npm install --save`).
    fn describe(&self) -> String;

    /// Add `spec` to the package set rooted at `home`.
    async fn add(&self, spec: &DependencySpecifier, home: &Path) -> Result<(), KilnError>;
}

/// Runs a configured command line, e.g. `npm install --save <spec>`.
#[derive(Debug, Clone)]
pub struct CommandPackageManager {
    program: String,
    add_args: Vec<String>,
}

impl CommandPackageManager {
    pub fn new(program: impl Into<String>, add_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            add_args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandPackageManager {
    fn default() -> Self {
        Self::new("npm", vec!["install".to_string(), "--save".to_string()])
    }
}

#[async_trait]
impl PackageManager for CommandPackageManager {
    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.add_args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn add(&self, spec: &DependencySpecifier, home: &Path) -> Result<(), KilnError> {
        let spec_str = spec.to_string();
        tracing::debug!(tool = %self.describe(), spec = %spec_str, home = %home.display(), "running package manager");

        let output = Command::new(&self.program)
            .args(&self.add_args)
            .arg(&spec_str)
            .current_dir(home)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| KilnError::ExternalTool {
                tool: self.program.clone(),
                spec: spec_str.clone(),
                status: "failed to start".to_string(),
                stderr: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let diagnostic = if !stderr.trim().is_empty() {
            stderr.trim().to_string()
        } else {
            stdout.trim().to_string()
        };

        Err(KilnError::ExternalTool {
            tool: self.program.clone(),
            spec: spec_str,
            status: output.status.to_string(),
            stderr: diagnostic,
        })
    }
}

/// Installs dependencies into a shared home and reports manifest changes.
pub struct Installer<'a, P: PackageManager + ?Sized> {
    home: &'a SharedHome,
    package_manager: &'a P,
}

impl<'a, P: PackageManager + ?Sized> Installer<'a, P> {
    pub fn new(home: &'a SharedHome, package_manager: &'a P) -> Self {
        Self {
            home,
            package_manager,
        }
    }

    pub fn home(&self) -> &SharedHome {
        self.home
    }

    /// Manual command a user can run when an automatic install fails.
    pub fn remediation(&self, spec: &DependencySpecifier) -> String {
        format!(
            "cd {} && {} {}",
            self.home.root().display(),
            self.package_manager.describe(),
            spec
        )
    }

    /// Install `spec`; `Ok(true)` when the manifest changed.
    ///
    /// Calling this again for an installed dependency still invokes the
    /// package manager, which leaves the manifest untouched.
    pub async fn install(&self, spec: &DependencySpecifier) -> Result<bool, KilnError> {
        self.home.ensure_home()?;
        let before = self.home.manifest_signature()?;
        self.package_manager.add(spec, self.home.root()).await?;
        let after = self.home.manifest_signature()?;
        let changed = before != after;
        tracing::debug!(spec = %spec, changed, "install finished");
        Ok(changed)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory package manager for tests.

    use super::*;
    use crate::home::Manifest;
    use std::sync::Mutex;

    /// Records every call and, unless told otherwise, adds the spec to the
    /// manifest the way a real package manager would.
    #[derive(Default)]
    pub struct FakePackageManager {
        pub calls: Mutex<Vec<String>>,
        /// Specs that fail with an external-tool error.
        pub failing: Vec<String>,
        /// When true, `add` succeeds without touching the manifest.
        pub inert: bool,
    }

    impl FakePackageManager {
        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PackageManager for FakePackageManager {
        fn describe(&self) -> String {
            "fake add".to_string()
        }

        async fn add(&self, spec: &DependencySpecifier, home: &Path) -> Result<(), KilnError> {
            let spec_str = spec.to_string();
            self.calls.lock().unwrap().push(spec_str.clone());
            if self.failing.contains(&spec_str) {
                return Err(KilnError::ExternalTool {
                    tool: "fake".into(),
                    spec: spec_str,
                    status: "exit status: 1".into(),
                    stderr: "npm ERR! 404 Not Found".into(),
                });
            }
            if self.inert {
                return Ok(());
            }
            let home = SharedHome::new(home);
            let mut manifest: Manifest = home.read_manifest();
            let source = match spec {
                DependencySpecifier::PlainPackage { range, .. } => {
                    range.clone().unwrap_or_else(|| "*".to_string())
                }
                _ => spec_str.clone(),
            };
            manifest.dependencies.insert(spec.canonical_name(), source);
            std::fs::write(home.manifest_path(), manifest.to_json().unwrap()).unwrap();
            std::fs::create_dir_all(home.installed_files_root().join(spec.canonical_name()))
                .unwrap();
            Ok(())
        }
    }
}
