use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;

/// Tunable behavior of a [`Duplicator`](crate::duplicator::Duplicator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuplicationOptions {
    /// Append `-<suffix>` to cloned node labels and variable display names.
    pub suffix_labels: bool,
    /// Audit every duplication right after it commits.
    pub verify_after_commit: bool,
    /// Retry once when the store reports a transient conflict.
    pub retry_transient: bool,
    /// Keep `sharedReferenceIds` on cloned nodes instead of clearing them.
    pub preserve_shared_references: bool,
}

impl Default for DuplicationOptions {
    fn default() -> Self {
        Self {
            suffix_labels: false,
            verify_after_commit: true,
            retry_transient: true,
            preserve_shared_references: false,
        }
    }
}

impl DuplicationOptions {
    /// Loads options from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}
