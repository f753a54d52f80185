//! Sort descriptors and string comparison modes.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// How string values are compared when filtering and sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Byte-for-byte comparison
    #[default]
    Exact,
    /// Ignores letter case
    CaseInsensitive,
    /// Ignores accents and other combining marks
    DiacriticInsensitive,
    /// Ignores both case and diacritics
    CaseAndDiacriticInsensitive,
}

impl ComparisonMode {
    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self,
            ComparisonMode::CaseInsensitive | ComparisonMode::CaseAndDiacriticInsensitive
        )
    }

    pub fn is_diacritic_insensitive(&self) -> bool {
        matches!(
            self,
            ComparisonMode::DiacriticInsensitive | ComparisonMode::CaseAndDiacriticInsensitive
        )
    }

    /// Returns the mode name used in explain output
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonMode::Exact => "exact",
            ComparisonMode::CaseInsensitive => "c",
            ComparisonMode::DiacriticInsensitive => "d",
            ComparisonMode::CaseAndDiacriticInsensitive => "cd",
        }
    }

    /// Folds a string into the canonical form this mode compares on
    pub fn fold<'a>(&self, s: &'a str) -> Cow<'a, str> {
        match self {
            ComparisonMode::Exact => Cow::Borrowed(s),
            ComparisonMode::CaseInsensitive => Cow::Owned(s.to_lowercase()),
            ComparisonMode::DiacriticInsensitive => Cow::Owned(strip_diacritics(s)),
            ComparisonMode::CaseAndDiacriticInsensitive => {
                Cow::Owned(strip_diacritics(s).to_lowercase())
            }
        }
    }
}

fn strip_diacritics(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}

/// A single ordering key.
///
/// Descriptors are applied in sequence: the first one is the primary key,
/// later ones only break ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortDescriptor {
    /// Attribute to sort by
    pub attribute: String,
    /// Ascending when true
    pub ascending: bool,
    /// String comparison mode
    pub mode: ComparisonMode,
}

impl SortDescriptor {
    pub fn new(attribute: impl Into<String>, ascending: bool, mode: ComparisonMode) -> Self {
        Self {
            attribute: attribute.into(),
            ascending,
            mode,
        }
    }

    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self::new(attribute, true, ComparisonMode::Exact)
    }

    pub fn descending(attribute: impl Into<String>) -> Self {
        Self::new(attribute, false, ComparisonMode::Exact)
    }

    /// Returns a copy with a different comparison mode
    pub fn with_mode(mut self, mode: ComparisonMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns a copy with the direction flipped
    pub fn reversed(mut self) -> Self {
        self.ascending = !self.ascending;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_modes() {
        assert_eq!(ComparisonMode::Exact.fold("Émile"), "Émile");
        assert_eq!(ComparisonMode::CaseInsensitive.fold("Émile"), "émile");
        assert_eq!(ComparisonMode::DiacriticInsensitive.fold("Émile"), "Emile");
        assert_eq!(
            ComparisonMode::CaseAndDiacriticInsensitive.fold("Émile"),
            "emile"
        );
    }

    #[test]
    fn test_mode_flags() {
        assert!(ComparisonMode::CaseAndDiacriticInsensitive.is_case_insensitive());
        assert!(ComparisonMode::CaseAndDiacriticInsensitive.is_diacritic_insensitive());
        assert!(!ComparisonMode::Exact.is_case_insensitive());
    }

    #[test]
    fn test_sort_descriptor() {
        let desc = SortDescriptor::descending("created_at");
        assert!(!desc.ascending);
        assert_eq!(desc.mode, ComparisonMode::Exact);
        assert!(desc.reversed().ascending);
    }

    #[test]
    fn test_mode_serde_names() {
        let mode: ComparisonMode =
            serde_json::from_str("\"case_and_diacritic_insensitive\"").unwrap();
        assert_eq!(mode, ComparisonMode::CaseAndDiacriticInsensitive);
    }
}
