//! Layered configuration for kiln.
//!
//! Settings are read from `.kiln/kiln.toml` and merged in this order, later
//! layers winning:
//!
//! 1. Built-in defaults
//! 2. User config (`<config_dir>/kiln/config.toml`)
//! 3. Project config (`<project>/.kiln/kiln.toml`)
//! 4. Environment (`KILN_INSTALL_MODE`, `KILN_OFFLINE`, `KILN_HOME`, `KILN_PACKAGE_MANAGER`)
//! 5. CLI flags
//!
//! List settings (`dependencies`, `modules.specifiers`) are concatenated
//! across the file layers with duplicates removed; scalars are replaced.
//! A relative `home_dir` or `KILN_HOME` is taken from the project root, a
//! relative `--home` from the directory kiln was invoked in.
//!
//! # Configuration File Format
//!
//! ```toml
//! dependencies = ["left-pad", "file:../shared-cmds", "git+https://example.com/x.git#main"]
//! install_mode = "auto"     # auto | manual | ask
//! offline = false
//!
//! [project]
//! name = "demo"
//!
//! [modules]
//! specifiers = ["./greet", "@scope/pkg/sub"]
//! dir = "commands"
//! discover = true
//! strict = false
//!
//! [package_manager]
//! command = "npm"
//! add_args = ["install", "--save"]
//! ```

use crate::deps::{CommandPackageManager, DependencySpecifier, InstallPolicy};
use crate::home::{HOME_ENV, SharedHome};
use crate::init::{CONFIG_FILE, get_kiln_dir};
use crate::resolver::ModuleSpecifier;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const INSTALL_MODE_ENV: &str = "KILN_INSTALL_MODE";
pub const OFFLINE_ENV: &str = "KILN_OFFLINE";
pub const PACKAGE_MANAGER_ENV: &str = "KILN_PACKAGE_MANAGER";

/// Default local module directory, relative to `.kiln/`.
pub const DEFAULT_MODULE_DIR: &str = "commands";

/// Project-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Command module settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulesSection {
    /// Module specifiers to load, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specifiers: Vec<String>,
    /// Local module root, relative to `.kiln/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Also load every module file found in the local module root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discover: Option<bool>,
    /// Abort on the first module that fails to load instead of skipping it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// External package manager invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManagerSection {
    pub command: String,
    #[serde(default)]
    pub add_args: Vec<String>,
}

impl Default for PackageManagerSection {
    fn default() -> Self {
        Self {
            command: "npm".to_string(),
            add_args: vec!["install".to_string(), "--save".to_string()],
        }
    }
}

/// One configuration file layer. Unset scalars fall through to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KilnToml {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_mode: Option<InstallPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_dir: Option<PathBuf>,
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub modules: ModulesSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<PackageManagerSection>,
}

impl KilnToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse kiln.toml")
    }

    /// Load `<kiln_dir>/kiln.toml`, or defaults if it does not exist.
    pub fn load_or_default(kiln_dir: &Path) -> Result<Self> {
        let path = kiln_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize kiln.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Merge `over` on top of `self`.
    pub fn merge(mut self, over: KilnToml) -> KilnToml {
        extend_unique(&mut self.dependencies, over.dependencies);
        extend_unique(&mut self.modules.specifiers, over.modules.specifiers);
        self.install_mode = over.install_mode.or(self.install_mode);
        self.offline = over.offline.or(self.offline);
        self.home_dir = over.home_dir.or(self.home_dir);
        self.project.name = over.project.name.or(self.project.name);
        self.modules.dir = over.modules.dir.or(self.modules.dir);
        self.modules.discover = over.modules.discover.or(self.modules.discover);
        self.modules.strict = over.modules.strict.or(self.modules.strict);
        self.package_manager = over.package_manager.or(self.package_manager);
        self
    }

    /// Add a dependency unless an equal specifier is already declared.
    /// Returns whether the list changed.
    pub fn add_dependency(&mut self, spec: &str) -> bool {
        let spec = spec.trim();
        if self.dependencies.iter().any(|d| d.trim() == spec) {
            return false;
        }
        self.dependencies.push(spec.to_string());
        true
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for dep in &self.dependencies {
            if let Err(e) = dep.parse::<DependencySpecifier>() {
                warnings.push(e.to_string());
            }
        }

        for spec in &self.modules.specifiers {
            if let Err(e) = spec.parse::<ModuleSpecifier>() {
                warnings.push(format!("Invalid module specifier '{}': {}", spec, e));
            }
        }

        if let Some(dir) = &self.modules.dir
            && Path::new(dir).is_absolute()
        {
            warnings.push(format!(
                "modules.dir '{}' is absolute; it should be relative to .kiln/",
                dir
            ));
        }

        if let Some(pm) = &self.package_manager
            && pm.command.trim().is_empty()
        {
            warnings.push("package_manager.command is empty".to_string());
        }

        warnings
    }
}

fn extend_unique(into: &mut Vec<String>, from: Vec<String>) {
    for item in from {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

/// Overrides taken from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub install_mode: Option<InstallPolicy>,
    pub offline: Option<bool>,
    pub home: Option<PathBuf>,
}

impl CliOverrides {
    /// Resolve relative path flags against `cwd`, the directory kiln was
    /// invoked from.
    pub fn relative_to(mut self, cwd: &Path) -> Self {
        self.home = self.home.map(|home| cwd.join(home));
        self
    }
}

/// Overrides taken from environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub install_mode: Option<InstallPolicy>,
    pub offline: Option<bool>,
    pub home: Option<PathBuf>,
    pub package_manager: Option<String>,
}

impl EnvOverrides {
    /// Read overrides through `lookup` (normally `std::env::var`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let install_mode = lookup(INSTALL_MODE_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.parse::<InstallPolicy>())
            .transpose()
            .with_context(|| format!("Invalid {}", INSTALL_MODE_ENV))?;
        let offline = lookup(OFFLINE_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
        let home = lookup(HOME_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let package_manager = lookup(PACKAGE_MANAGER_ENV).filter(|v| !v.trim().is_empty());
        Ok(Self {
            install_mode,
            offline,
            home,
            package_manager,
        })
    }

    pub fn from_process_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// What the dependency core needs from a project's configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDependencies {
    pub dependencies: Vec<String>,
    pub install_mode: InstallPolicy,
    pub offline: bool,
}

/// Fully merged configuration for one invocation.
#[derive(Debug, Clone)]
pub struct KilnConfig {
    /// Project root (the directory containing `.kiln/`)
    pub project_dir: PathBuf,
    /// Path to the `.kiln` directory
    pub kiln_dir: PathBuf,
    /// Merged file layers
    pub toml: KilnToml,
    /// Whether a project config file was found
    pub has_project_config: bool,
    pub install_mode: InstallPolicy,
    pub offline: bool,
    pub home_dir: PathBuf,
    pub package_manager: PackageManagerSection,
}

impl KilnConfig {
    /// Load config for `project_dir` from the real user config, process
    /// environment and the given CLI overrides.
    pub fn new(project_dir: PathBuf, cli: &CliOverrides) -> Result<Self> {
        let user_config = dirs::config_dir().map(|d| d.join("kiln").join("config.toml"));
        let env = EnvOverrides::from_process_env()?;
        Self::load(project_dir, user_config.as_deref(), &env, cli)
    }

    /// Merge every layer explicitly. Used by `new` and by tests.
    pub fn load(
        project_dir: PathBuf,
        user_config: Option<&Path>,
        env: &EnvOverrides,
        cli: &CliOverrides,
    ) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let kiln_dir = get_kiln_dir(&project_dir);

        let mut toml = KilnToml::default();
        if let Some(path) = user_config.filter(|p| p.exists()) {
            toml = toml.merge(KilnToml::load(path)?);
        }
        let has_project_config = kiln_dir.join(CONFIG_FILE).exists();
        toml = toml.merge(KilnToml::load_or_default(&kiln_dir)?);

        let install_mode = cli
            .install_mode
            .or(env.install_mode)
            .or(toml.install_mode)
            .unwrap_or_default();
        let offline = cli
            .offline
            .or(env.offline)
            .or(toml.offline)
            .unwrap_or(false);

        let home_dir = match cli
            .home
            .clone()
            .or_else(|| env.home.clone())
            .or_else(|| toml.home_dir.clone())
        {
            Some(dir) if dir.is_relative() => project_dir.join(dir),
            Some(dir) => dir,
            None => SharedHome::default_root().context(
                "Cannot determine a data directory for the shared home; set KILN_HOME or --home",
            )?,
        };

        let mut package_manager = toml.package_manager.clone().unwrap_or_default();
        if let Some(command) = &env.package_manager {
            package_manager.command = command.clone();
        }

        Ok(Self {
            project_dir,
            kiln_dir,
            toml,
            has_project_config,
            install_mode,
            offline,
            home_dir,
            package_manager,
        })
    }

    pub fn home(&self) -> SharedHome {
        SharedHome::new(&self.home_dir)
    }

    pub fn dependencies(&self) -> ProjectDependencies {
        ProjectDependencies {
            dependencies: self.toml.dependencies.clone(),
            install_mode: self.install_mode,
            offline: self.offline,
        }
    }

    /// Local module root: `.kiln/<modules.dir>`.
    pub fn module_root(&self) -> PathBuf {
        self.kiln_dir.join(
            self.toml
                .modules
                .dir
                .as_deref()
                .unwrap_or(DEFAULT_MODULE_DIR),
        )
    }

    pub fn module_specifiers(&self) -> &[String] {
        &self.toml.modules.specifiers
    }

    pub fn discover_modules(&self) -> bool {
        self.toml.modules.discover.unwrap_or(true)
    }

    pub fn strict_modules(&self) -> bool {
        self.toml.modules.strict.unwrap_or(false)
    }

    pub fn package_manager(&self) -> CommandPackageManager {
        CommandPackageManager::new(
            self.package_manager.command.clone(),
            self.package_manager.add_args.clone(),
        )
    }

    /// Path to the project's `kiln.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.kiln_dir.join(CONFIG_FILE)
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
