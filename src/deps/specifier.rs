//! Dependency specifier parsing.
//!
//! A specifier is one of three shapes, told apart by prefix alone:
//!
//! | Prefix                          | Variant        | Example                                   |
//! |---------------------------------|----------------|-------------------------------------------|
//! | `git+ssh://`, `git+https://`    | `GitRepo`      | `git+https://host/org/tools.git#v1.2`     |
//! | `file:`                         | `LocalPath`    | `file:../shared-commands`                 |
//! | anything else                   | `PlainPackage` | `left-pad`, `@scope/tool@^2.0`            |

use crate::errors::KilnError;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

const GIT_SSH_PREFIX: &str = "git+ssh://";
const GIT_HTTPS_PREFIX: &str = "git+https://";
const FILE_PREFIX: &str = "file:";

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(@[a-z0-9\-~][a-z0-9\-._~]*/)?[a-z0-9\-~][a-z0-9\-._~]*$")
        .expect("package name pattern is a valid static regex")
});

/// Something the package manager can install into the shared home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySpecifier {
    /// Registry package, optionally with a version range.
    PlainPackage { name: String, range: Option<String> },
    /// Directory on disk, written as `file:<path>`.
    LocalPath { path: String },
    /// Git repository with an optional `#ref` (branch, tag or commit).
    GitRepo { url: String, reference: Option<String> },
}

impl DependencySpecifier {
    /// Name used to look the dependency up in the manifest.
    ///
    /// Exact for `PlainPackage`. For local and git sources the real name is
    /// only known after install, so this is the last path segment and only
    /// serves as a fallback lookup.
    pub fn canonical_name(&self) -> String {
        match self {
            DependencySpecifier::PlainPackage { name, .. } => name.clone(),
            DependencySpecifier::LocalPath { path } => last_segment(path).to_string(),
            DependencySpecifier::GitRepo { url, .. } => {
                let segment = last_segment(url);
                segment.strip_suffix(".git").unwrap_or(segment).to_string()
            }
        }
    }

    /// Prefix marker of the source kind, if any (`file:` or `git+`).
    pub fn source_marker(&self) -> Option<&'static str> {
        match self {
            DependencySpecifier::PlainPackage { .. } => None,
            DependencySpecifier::LocalPath { .. } => Some(FILE_PREFIX),
            DependencySpecifier::GitRepo { .. } => Some("git+"),
        }
    }

    /// Resolve a relative `file:` path against `base`.
    ///
    /// The package manager runs inside the shared home, so paths handed to
    /// it must be absolute. Other variants are returned unchanged.
    pub fn anchored_at(&self, base: &Path) -> DependencySpecifier {
        match self {
            DependencySpecifier::LocalPath { path } if Path::new(path).is_relative() => {
                DependencySpecifier::LocalPath {
                    path: normalize(&base.join(path)).display().to_string(),
                }
            }
            other => other.clone(),
        }
    }
}

/// Lexically drop `.` and fold `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn last_segment(s: &str) -> &str {
    s.trim_end_matches('/')
        .rsplit(['/', '\\', ':'])
        .next()
        .unwrap_or(s)
}

impl std::fmt::Display for DependencySpecifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencySpecifier::PlainPackage { name, range: None } => write!(f, "{}", name),
            DependencySpecifier::PlainPackage {
                name,
                range: Some(range),
            } => write!(f, "{}@{}", name, range),
            DependencySpecifier::LocalPath { path } => write!(f, "{}{}", FILE_PREFIX, path),
            DependencySpecifier::GitRepo {
                url,
                reference: None,
            } => write!(f, "{}", url),
            DependencySpecifier::GitRepo {
                url,
                reference: Some(reference),
            } => write!(f, "{}#{}", url, reference),
        }
    }
}

impl std::str::FromStr for DependencySpecifier {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = |reason: &str| KilnError::InvalidSpecifier {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("specifier is empty"));
        }

        if raw.starts_with(GIT_SSH_PREFIX) || raw.starts_with(GIT_HTTPS_PREFIX) {
            let (url, reference) = match raw.split_once('#') {
                Some((url, reference)) if reference.is_empty() => {
                    return Err(invalid(&format!("empty git ref after '#' in {}", url)));
                }
                Some((url, reference)) => (url.to_string(), Some(reference.to_string())),
                None => (raw.to_string(), None),
            };
            let host_and_path = url
                .split_once("://")
                .map(|(_, rest)| rest)
                .unwrap_or_default();
            if host_and_path.is_empty() {
                return Err(invalid("git URL has no host or path"));
            }
            return Ok(DependencySpecifier::GitRepo { url, reference });
        }

        if raw.starts_with("git+") {
            return Err(invalid(
                "unsupported git scheme; use git+ssh:// or git+https://",
            ));
        }

        if let Some(path) = raw.strip_prefix(FILE_PREFIX) {
            if path.is_empty() {
                return Err(invalid("'file:' needs a directory path"));
            }
            return Ok(DependencySpecifier::LocalPath {
                path: path.to_string(),
            });
        }

        // A leading '@' belongs to the scope, so the version separator is the
        // last '@' after position 0.
        let search_from = usize::from(raw.starts_with('@'));
        let (name, range) = match raw[search_from..].rfind('@') {
            Some(idx) => {
                let split = idx + search_from;
                let range = &raw[split + 1..];
                if range.is_empty() {
                    return Err(invalid("empty version range after '@'"));
                }
                (&raw[..split], Some(range.to_string()))
            }
            None => (raw, None),
        };

        if !PACKAGE_NAME.is_match(name) {
            return Err(invalid(
                "package names must be lowercase and may only contain letters, digits, '-', '.', '_' and '~', optionally under an @scope/",
            ));
        }

        Ok(DependencySpecifier::PlainPackage {
            name: name.to_string(),
            range,
        })
    }
}

/// Parse a list of specifiers, failing on the first invalid entry.
pub fn parse_all(specs: &[String]) -> Result<Vec<DependencySpecifier>, KilnError> {
    specs.iter().map(|s| s.parse()).collect()
}

/// Parse a list of specifiers declared by the project at `project_dir`,
/// anchoring relative `file:` paths there.
pub fn parse_all_in(
    specs: &[String],
    project_dir: &Path,
) -> Result<Vec<DependencySpecifier>, KilnError> {
    Ok(parse_all(specs)?
        .iter()
        .map(|spec| spec.anchored_at(project_dir))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> DependencySpecifier {
        s.parse().unwrap()
    }

    #[test]
    fn test_plain_package_bare_name() {
        assert_eq!(
            parse("left-pad"),
            DependencySpecifier::PlainPackage {
                name: "left-pad".into(),
                range: None
            }
        );
    }

    #[test]
    fn test_plain_package_with_range() {
        let spec = parse("left-pad@^1.3.0");
        assert_eq!(spec.canonical_name(), "left-pad");
        assert_eq!(spec.to_string(), "left-pad@^1.3.0");
    }

    #[test]
    fn test_scoped_package_keeps_scope() {
        let spec = parse("@scope/tool");
        assert_eq!(spec.canonical_name(), "@scope/tool");

        let spec = parse("@scope/tool@2.x");
        assert_eq!(
            spec,
            DependencySpecifier::PlainPackage {
                name: "@scope/tool".into(),
                range: Some("2.x".into())
            }
        );
    }

    #[test]
    fn test_local_path() {
        let spec = parse("file:../shared-commands/");
        assert_eq!(
            spec,
            DependencySpecifier::LocalPath {
                path: "../shared-commands/".into()
            }
        );
        assert_eq!(spec.canonical_name(), "shared-commands");
        assert_eq!(spec.source_marker(), Some("file:"));
    }

    #[test]
    fn test_relative_local_path_anchored_at_project() {
        let spec = parse("file:../shared-commands/").anchored_at(Path::new("/work/proj"));
        assert_eq!(
            spec,
            DependencySpecifier::LocalPath {
                path: "/work/shared-commands".into()
            }
        );
        assert_eq!(spec.to_string(), "file:/work/shared-commands");
        assert_eq!(spec.canonical_name(), "shared-commands");

        let nested = parse("file:./vendor/./tools").anchored_at(Path::new("/work/proj"));
        assert_eq!(nested.to_string(), "file:/work/proj/vendor/tools");
    }

    #[test]
    fn test_anchoring_leaves_absolute_and_remote_specs_alone() {
        let base = Path::new("/work/proj");
        for raw in [
            "file:/opt/shared",
            "left-pad@^1.3.0",
            "git+https://host/org/tools.git#main",
        ] {
            assert_eq!(parse(raw).anchored_at(base), parse(raw));
        }
    }

    #[test]
    fn test_parse_all_in_anchors_every_local_path() {
        let specs = parse_all_in(
            &["left-pad".to_string(), "file:../shared".to_string()],
            Path::new("/work/proj"),
        )
        .unwrap();
        assert_eq!(specs[0].to_string(), "left-pad");
        assert_eq!(specs[1].to_string(), "file:/work/shared");
    }

    #[test]
    fn test_git_with_ref() {
        let spec = parse("git+ssh://git@github.com/org/tools.git#v1.2");
        assert_eq!(
            spec,
            DependencySpecifier::GitRepo {
                url: "git+ssh://git@github.com/org/tools.git".into(),
                reference: Some("v1.2".into())
            }
        );
        assert_eq!(spec.canonical_name(), "tools");
        assert_eq!(spec.to_string(), "git+ssh://git@github.com/org/tools.git#v1.2");
    }

    #[test]
    fn test_git_https_without_ref() {
        let spec = parse("git+https://example.com/org/cmds");
        assert_eq!(spec.canonical_name(), "cmds");
        assert_eq!(spec.source_marker(), Some("git+"));
    }

    #[test]
    fn test_git_at_sign_is_not_a_version_separator() {
        // Without the prefix check the '@' in the URL would split as a range.
        let spec = parse("git+ssh://git@host/x.git");
        assert!(matches!(spec, DependencySpecifier::GitRepo { .. }));
    }

    #[test]
    fn test_invalid_specifiers() {
        for bad in [
            "",
            "   ",
            "file:",
            "git+ftp://host/x",
            "git+https://",
            "git+https://host/x#",
            "Left-Pad",
            "left pad",
            "left-pad@",
            "@scope",
        ] {
            let err = bad.parse::<DependencySpecifier>().unwrap_err();
            assert!(
                matches!(err, KilnError::InvalidSpecifier { .. }),
                "expected InvalidSpecifier for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_parse_all_reports_offending_spec() {
        let err = parse_all(&["left-pad".into(), "Bad Name".into()]).unwrap_err();
        assert!(err.to_string().contains("Bad Name"));
    }
}
