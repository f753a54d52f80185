//! Query Options
//!
//! Defaults applied to every query specification built from these options:
//! batch size and string comparison mode for `sort_by`.

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::query::{ComparisonMode, QueryError, QueryResult};

/// Process-wide defaults, installed at most once
static GLOBAL_OPTIONS: OnceLock<QueryOptions> = OnceLock::new();

/// Query construction defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Fetch batch size for new specs (default: 20)
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Comparison mode for `sort_by` and attribute helpers (default: case and diacritic insensitive)
    #[serde(default = "default_comparison_mode")]
    pub default_comparison_mode: ComparisonMode,
}

fn default_batch_size() -> usize {
    20
}

fn default_comparison_mode() -> ComparisonMode {
    ComparisonMode::CaseAndDiacriticInsensitive
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            default_comparison_mode: default_comparison_mode(),
        }
    }
}

impl QueryOptions {
    /// Create options with a specific batch size
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            default_batch_size: batch_size,
            ..Default::default()
        }
    }

    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> QueryResult<Self> {
        serde_json::from_str(json).map_err(|e| QueryError::InvalidConfig(e.to_string()))
    }

    /// Load options from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            QueryError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    /// Installs the process-wide defaults.
    ///
    /// Fails if defaults were already installed or already read through
    /// [`QueryOptions::global`].
    pub fn install_global(self) -> QueryResult<()> {
        GLOBAL_OPTIONS
            .set(self)
            .map_err(|_| QueryError::InvalidConfig("global options already installed".into()))
    }

    /// Returns the process-wide defaults, freezing them on first read
    pub fn global() -> &'static QueryOptions {
        GLOBAL_OPTIONS.get_or_init(QueryOptions::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_options() {
        let options = QueryOptions::default();
        assert_eq!(options.default_batch_size, 20);
        assert_eq!(
            options.default_comparison_mode,
            ComparisonMode::CaseAndDiacriticInsensitive
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options = QueryOptions::from_json_str(r#"{"default_batch_size": 50}"#).unwrap();
        assert_eq!(options.default_batch_size, 50);
        assert_eq!(
            options.default_comparison_mode,
            ComparisonMode::CaseAndDiacriticInsensitive
        );
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = QueryOptions::from_json_str(r#"{"default_batch_size": "many"}"#).unwrap_err();
        assert_eq!(err.code(), "LIVEFETCH_INVALID_CONFIG");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_comparison_mode": "exact"}}"#).unwrap();

        let options = QueryOptions::from_file(file.path()).unwrap();
        assert_eq!(options.default_comparison_mode, ComparisonMode::Exact);
        assert_eq!(options.default_batch_size, 20);
    }

    #[test]
    fn test_missing_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = QueryOptions::from_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(QueryError::InvalidConfig(_))));
    }

    #[test]
    fn test_global_is_frozen_after_first_read() {
        let first = QueryOptions::global().clone();
        assert!(QueryOptions::with_batch_size(99).install_global().is_err());
        assert_eq!(QueryOptions::global(), &first);
    }
}
