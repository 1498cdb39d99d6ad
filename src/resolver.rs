//! Module specifier resolution.
//!
//! `./greet` and `../x` resolve under the project's local module root only.
//! `pkg`, `@scope/pkg` and `@scope/pkg/sub` resolve under the shared home's
//! installed-files tree only. Neither kind falls back to the other, so a
//! local file can never shadow an installed package or vice versa.

use crate::errors::KilnError;
use crate::home::SharedHome;
use std::path::{Path, PathBuf};

/// File extensions probed after the bare path, in priority order.
pub const MODULE_EXTENSIONS: &[&str] = &[".toml", ".sh"];

/// Entry file probed inside a package directory.
const INDEX_STEM: &str = "index";

/// A parsed module specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSpecifier {
    /// Relative to the local module root, e.g. `./greet`.
    Local(String),
    /// Installed package with an optional sub-path, e.g. `@scope/pkg/sub`.
    Package { name: String, subpath: Option<String> },
}

impl ModuleSpecifier {
    /// Path relative to the root this specifier resolves against.
    pub fn relative_path(&self) -> PathBuf {
        match self {
            ModuleSpecifier::Local(path) => PathBuf::from(path),
            ModuleSpecifier::Package { name, subpath } => {
                let mut path = PathBuf::from(name);
                if let Some(sub) = subpath {
                    path.push(sub);
                }
                path
            }
        }
    }
}

impl std::fmt::Display for ModuleSpecifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleSpecifier::Local(path) => write!(f, "{}", path),
            ModuleSpecifier::Package {
                name,
                subpath: None,
            } => write!(f, "{}", name),
            ModuleSpecifier::Package {
                name,
                subpath: Some(sub),
            } => write!(f, "{}/{}", name, sub),
        }
    }
}

impl std::str::FromStr for ModuleSpecifier {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(KilnError::user_config("Module specifier is empty"));
        }
        if raw.starts_with('/') || Path::new(raw).is_absolute() {
            return Err(KilnError::user_config(format!(
                "Module specifier '{}' is absolute; use './path' relative to the module directory or a package name",
                raw
            )));
        }
        if raw.starts_with('.') {
            return Ok(ModuleSpecifier::Local(raw.to_string()));
        }

        let segments: Vec<&str> = raw.split('/').collect();
        if segments.iter().any(|seg| seg.is_empty() || *seg == "..") {
            return Err(KilnError::user_config(format!(
                "Module specifier '{}' has an empty or '..' path segment",
                raw
            )));
        }

        let name_len = if raw.starts_with('@') { 2 } else { 1 };
        if segments.len() < name_len {
            return Err(KilnError::user_config(format!(
                "Scoped module specifier '{}' needs a package name after the scope",
                raw
            )));
        }

        let name = segments[..name_len].join("/");
        let subpath = (segments.len() > name_len).then(|| segments[name_len..].join("/"));
        Ok(ModuleSpecifier::Package { name, subpath })
    }
}

/// Candidate files for `base`: the bare path, then each extension.
fn candidates(base: &Path) -> Vec<PathBuf> {
    let mut out = vec![base.to_path_buf()];
    for ext in MODULE_EXTENSIONS {
        let mut with_ext = base.as_os_str().to_os_string();
        with_ext.push(ext);
        out.push(PathBuf::from(with_ext));
    }
    out
}

/// Probe `candidates` in order, recording each in `searched`.
fn probe(candidates: Vec<PathBuf>, searched: &mut Vec<PathBuf>) -> Option<PathBuf> {
    for candidate in candidates {
        let found = candidate.is_file();
        searched.push(candidate);
        if found {
            return searched.last().cloned();
        }
    }
    None
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Resolve `spec` to an absolute, loadable file path.
pub fn resolve_module(
    spec: &str,
    local_root: &Path,
    home: &SharedHome,
) -> Result<PathBuf, KilnError> {
    let parsed: ModuleSpecifier = spec.parse()?;
    let local_root = absolutize(local_root);
    let mut searched = Vec::new();

    match &parsed {
        ModuleSpecifier::Local(_) => {
            let base = local_root.join(parsed.relative_path());
            if let Some(found) = probe(candidates(&base), &mut searched) {
                tracing::debug!(spec, path = %found.display(), "resolved local module");
                return Ok(found);
            }
            Err(KilnError::ModuleNotFound {
                spec: spec.to_string(),
                searched,
                hint: format!(
                    "Local modules resolve relative to {}. Check the path and file extension ({}).",
                    local_root.display(),
                    MODULE_EXTENSIONS.join(", ")
                ),
            })
        }
        ModuleSpecifier::Package { name, .. } => {
            let shared_root = absolutize(&home.installed_files_root());
            let base = shared_root.join(parsed.relative_path());
            if let Some(found) = probe(candidates(&base), &mut searched) {
                tracing::debug!(spec, path = %found.display(), "resolved package module");
                return Ok(found);
            }
            if base.is_dir()
                && let Some(found) = probe(candidates(&base.join(INDEX_STEM)), &mut searched)
            {
                tracing::debug!(spec, path = %found.display(), "resolved package index module");
                return Ok(found);
            }
            Err(KilnError::ModuleNotFound {
                spec: spec.to_string(),
                searched,
                hint: format!(
                    "Package modules resolve under {} (not the local module root {}). Add '{}' to `dependencies` in kiln.toml or run 'kiln deps install'.",
                    shared_root.display(),
                    local_root.display(),
                    name
                ),
            })
        }
    }
}
