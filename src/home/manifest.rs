//! The shared-home manifest (`package.json`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The subset of `package.json` kiln reads and writes.
///
/// Unknown keys written by the package manager are kept in `extra` so a
/// round trip through kiln never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_private")]
    pub private: bool,
    /// Installed package name -> source (version range, `file:` or `git+` URL).
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_name() -> String {
    "kiln-home".to_string()
}

fn default_private() -> bool {
    true
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            name: default_name(),
            private: default_private(),
            dependencies: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Manifest {
    pub fn parse(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// Whether `name` is a key in `dependencies`.
    pub fn contains(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    /// Whether any dependency was recorded with exactly this source.
    ///
    /// Trailing slashes are ignored so `file:../x/` matches `file:../x`.
    pub fn has_source(&self, source: &str) -> bool {
        let wanted = source.trim_end_matches('/');
        self.dependencies
            .values()
            .any(|v| v.trim_end_matches('/') == wanted)
    }
}
