//! Concept type.
//!
//! This module provides the `Concept` struct, a code and its display text as
//! held by one code system version.

/// A concept of a code system version.
///
/// # Examples
///
/// ```
/// use terminology_types::Concept;
///
/// let concept = Concept::new("ParentA", Some("Parent A"));
/// assert_eq!(concept.code, "ParentA");
/// assert!(concept.display_contains("parent"));
/// assert!(!concept.display_contains("child"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Concept {
    /// Code, unique within its code system version.
    pub code: String,
    /// Human readable display text.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub display: Option<String>,
}

impl Concept {
    /// Creates a new concept.
    pub fn new(code: impl Into<String>, display: Option<impl Into<String>>) -> Self {
        Self {
            code: code.into(),
            display: display.map(Into::into),
        }
    }

    /// Returns true if the display contains `text`, ignoring case.
    ///
    /// Concepts without a display never match.
    pub fn display_contains(&self, text: &str) -> bool {
        self.display
            .as_deref()
            .is_some_and(|display| contains_ignore_case(display, text))
    }
}

/// Case-insensitive substring test used by expansion text filters.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
