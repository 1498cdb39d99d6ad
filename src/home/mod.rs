//! Shared home: the per-user directory that holds installed command packages.
//!
//! ```text
//! <shared-home>/
//! ├── package.json     # manifest, the only record of what is installed
//! └── node_modules/    # installed files, <name>/... or <@scope>/<name>/...
//! ```
//!
//! The home is created lazily by `ensure_home` and never deleted by kiln.
//! Only the installer mutates it.

pub mod manifest;

pub use manifest::Manifest;

use crate::deps::DependencySpecifier;
use crate::errors::KilnError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Manifest file name inside the shared home.
pub const MANIFEST_FILE: &str = "package.json";

/// Installed-files directory inside the shared home.
pub const INSTALLED_FILES_DIR: &str = "node_modules";

/// Environment variable that overrides the shared home location.
pub const HOME_ENV: &str = "KILN_HOME";

/// Handle to a shared home directory.
#[derive(Debug, Clone)]
pub struct SharedHome {
    root: PathBuf,
}

impl SharedHome {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform default: `<data_dir>/kiln`, e.g. `~/.local/share/kiln`.
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("kiln"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn installed_files_root(&self) -> PathBuf {
        self.root.join(INSTALLED_FILES_DIR)
    }

    /// Create the home directory, the installed-files tree and an empty
    /// manifest if they are missing. An existing manifest is never touched.
    pub fn ensure_home(&self) -> Result<(), KilnError> {
        let installed = self.installed_files_root();
        std::fs::create_dir_all(&installed).map_err(|e| KilnError::io(&installed, e))?;

        let manifest_path = self.manifest_path();
        if !manifest_path.exists() {
            let content = Manifest::default().to_json().map_err(|e| {
                KilnError::io(&manifest_path, std::io::Error::other(e.to_string()))
            })?;
            std::fs::write(&manifest_path, content)
                .map_err(|e| KilnError::io(&manifest_path, e))?;
            tracing::debug!(home = %self.root.display(), "created shared home");
        }
        Ok(())
    }

    /// Read the manifest, treating a missing or unparsable file as empty.
    ///
    /// A corrupt manifest is logged as a warning, never returned as an error.
    pub fn read_manifest(&self) -> Manifest {
        let path = self.manifest_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Manifest::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read shared-home manifest; treating as empty");
                return Manifest::default();
            }
        };
        match Manifest::parse(&content) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "shared-home manifest is corrupt; treating as empty");
                Manifest::default()
            }
        }
    }

    /// Whether the manifest records `spec` as installed.
    pub fn is_installed(&self, spec: &DependencySpecifier) -> bool {
        let manifest = self.read_manifest();
        match spec {
            DependencySpecifier::PlainPackage { name, .. } => manifest.contains(name),
            DependencySpecifier::LocalPath { .. } | DependencySpecifier::GitRepo { .. } => {
                if manifest.has_source(&spec.to_string()) {
                    return true;
                }
                let marker = spec.source_marker().unwrap_or_default();
                manifest
                    .dependencies
                    .get(&spec.canonical_name())
                    .is_some_and(|source| source.starts_with(marker))
            }
        }
    }

    /// Hex SHA-256 of the manifest bytes. A missing manifest hashes as empty.
    pub fn manifest_signature(&self) -> Result<String, KilnError> {
        let path = self.manifest_path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(KilnError::io(&path, e)),
        };
        let digest = Sha256::digest(&bytes);
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Installed dependencies as `(name, source)`, sorted by name.
    pub fn installed_dependencies(&self) -> Vec<(String, String)> {
        self.read_manifest().dependencies.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(home: &SharedHome, content: &str) {
        std::fs::create_dir_all(home.root()).unwrap();
        std::fs::write(home.manifest_path(), content).unwrap();
    }

    #[test]
    fn test_ensure_home_creates_layout() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path().join("home"));
        home.ensure_home().unwrap();
        assert!(home.installed_files_root().is_dir());
        let manifest = Manifest::parse(&std::fs::read_to_string(home.manifest_path()).unwrap())
            .unwrap();
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn test_ensure_home_is_idempotent_and_keeps_manifest() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        write_manifest(&home, r#"{"dependencies": {"left-pad": "^1.3.0"}}"#);
        let before = home.manifest_signature().unwrap();
        home.ensure_home().unwrap();
        home.ensure_home().unwrap();
        assert_eq!(home.manifest_signature().unwrap(), before);
    }

    #[test]
    fn test_ensure_home_fails_when_root_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("home");
        std::fs::write(&blocker, "not a dir").unwrap();
        let err = SharedHome::new(&blocker).ensure_home().unwrap_err();
        assert!(matches!(err, KilnError::Io { .. }));
    }

    #[test]
    fn test_is_installed_plain_package_ignores_range() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        write_manifest(&home, r#"{"dependencies": {"left-pad": "^1.3.0"}}"#);
        assert!(home.is_installed(&"left-pad".parse().unwrap()));
        assert!(home.is_installed(&"left-pad@^2".parse().unwrap()));
        assert!(!home.is_installed(&"right-pad".parse().unwrap()));
    }

    #[test]
    fn test_is_installed_local_and_git_by_source() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        write_manifest(
            &home,
            r#"{"dependencies": {
                "my-cmds": "file:../my-cmds",
                "tools": "git+https://example.com/org/tools.git#main"
            }}"#,
        );
        assert!(home.is_installed(&"file:../my-cmds".parse().unwrap()));
        assert!(home.is_installed(&"git+https://example.com/org/tools.git#main".parse().unwrap()));
        // Same name, different source kind: a registry install does not satisfy a git dep.
        write_manifest(&home, r#"{"dependencies": {"tools": "^1.0.0"}}"#);
        assert!(!home.is_installed(&"git+https://example.com/org/tools.git".parse().unwrap()));
    }

    #[test]
    fn test_is_installed_git_fallback_by_name() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        write_manifest(
            &home,
            r#"{"dependencies": {"tools": "git+ssh://git@example.com/org/tools.git#abc123"}}"#,
        );
        assert!(home.is_installed(&"git+https://example.com/org/tools.git".parse().unwrap()));
    }

    #[test]
    fn test_is_installed_missing_manifest_is_false() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path().join("never-created"));
        assert!(!home.is_installed(&"left-pad".parse().unwrap()));
    }

    #[test]
    fn test_is_installed_corrupt_manifest_is_false() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        write_manifest(&home, "{ this is not json");
        assert!(!home.is_installed(&"left-pad".parse().unwrap()));
        assert!(home.installed_dependencies().is_empty());
    }

    #[test]
    fn test_manifest_signature_tracks_content() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        let empty = home.manifest_signature().unwrap();
        assert_eq!(empty.len(), 64);

        write_manifest(&home, r#"{"dependencies": {}}"#);
        let first = home.manifest_signature().unwrap();
        assert_ne!(first, empty);
        assert_eq!(home.manifest_signature().unwrap(), first);

        write_manifest(&home, r#"{"dependencies": {"left-pad": "^1.3.0"}}"#);
        assert_ne!(home.manifest_signature().unwrap(), first);
    }

    #[test]
    fn test_installed_dependencies_sorted() {
        let dir = tempdir().unwrap();
        let home = SharedHome::new(dir.path());
        write_manifest(&home, r#"{"dependencies": {"zeta": "1", "@a/b": "2", "alpha": "3"}}"#);
        let names: Vec<String> = home
            .installed_dependencies()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["@a/b", "alpha", "zeta"]);
    }
}
