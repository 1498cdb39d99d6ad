//! Persisted key/value state for a project (`.kiln/state.json`).
//!
//! Commands and users can stash small JSON values here between runs:
//!
//! ```json
//! {
//!   "last_deploy": { "value": "2024-05-01", "updated_at": "2024-05-01T10:00:00Z" }
//! }
//! ```

use crate::errors::KilnError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

pub struct StateStore {
    state_file: PathBuf,
}

impl StateStore {
    pub fn new(state_file: PathBuf) -> Self {
        Self { state_file }
    }

    pub fn path(&self) -> &Path {
        &self.state_file
    }

    /// Get the entry for `key`, if any.
    pub fn get(&self, key: &str) -> Option<StateEntry> {
        self.read_lenient().remove(key)
    }

    /// Store `raw` under `key`. `raw` is parsed as JSON when it can be,
    /// otherwise it is stored as a string.
    pub fn set(&self, key: &str, raw: &str) -> Result<StateEntry, KilnError> {
        validate_key(key)?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        let entry = StateEntry {
            value,
            updated_at: Utc::now(),
        };

        let mut entries = self.read_strict()?;
        entries.insert(key.to_string(), entry.clone());
        self.write(&entries)?;
        tracing::debug!(key, "state entry set");
        Ok(entry)
    }

    /// Remove `key`. Returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool, KilnError> {
        let mut entries = self.read_strict()?;
        let existed = entries.remove(key).is_some();
        if existed {
            self.write(&entries)?;
        }
        Ok(existed)
    }

    /// All entries, sorted by key.
    pub fn entries(&self) -> BTreeMap<String, StateEntry> {
        self.read_lenient()
    }

    /// Remove every entry. Returns how many were removed.
    ///
    /// A corrupt file is replaced rather than reported.
    pub fn clear(&self) -> Result<usize, KilnError> {
        let count = self.read_lenient().len();
        self.write(&BTreeMap::new())?;
        Ok(count)
    }

    fn read_strict(&self) -> Result<BTreeMap<String, StateEntry>, KilnError> {
        if !self.state_file.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.state_file)
            .map_err(|e| KilnError::io(&self.state_file, e))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| KilnError::State {
            message: format!(
                "{} is not a valid state file ({}). Fix or delete it, or run 'kiln state clear'",
                self.state_file.display(),
                e
            ),
        })
    }

    fn read_lenient(&self) -> BTreeMap<String, StateEntry> {
        match self.read_strict() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %self.state_file.display(), error = %e, "state file unreadable; treating as empty");
                BTreeMap::new()
            }
        }
    }

    fn write(&self, entries: &BTreeMap<String, StateEntry>) -> Result<(), KilnError> {
        let content = serde_json::to_string_pretty(entries).map_err(|e| KilnError::State {
            message: format!("failed to serialize state: {}", e),
        })?;
        if let Some(parent) = self.state_file.parent() {
            fs::create_dir_all(parent).map_err(|e| KilnError::io(parent, e))?;
        }
        let tmp = self.state_file.with_extension("json.tmp");
        fs::write(&tmp, format!("{}\n", content)).map_err(|e| KilnError::io(&tmp, e))?;
        fs::rename(&tmp, &self.state_file).map_err(|e| KilnError::io(&self.state_file, e))?;
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), KilnError> {
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(KilnError::user_config(format!(
            "Invalid state key '{}': keys must be non-empty and contain no whitespace",
            key
        )));
    }
    Ok(())
}
