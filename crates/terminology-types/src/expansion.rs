//! Expansion result types.
//!
//! An expansion is the flattened, deduplicated list of codes a value set
//! contains, plus metadata describing the window that was applied.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One code in an expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExpansionContains {
    /// Code system URL.
    pub system: String,
    /// Code system version, when known.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub version: Option<String>,
    /// Code.
    pub code: String,
    /// Display text.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub display: Option<String>,
}

impl ExpansionContains {
    /// Returns true if this entry is `(system, code)`.
    ///
    /// A `None` system matches any system.
    pub fn matches(&self, system: Option<&str>, code: &str) -> bool {
        self.code == code && system.map_or(true, |s| s == self.system)
    }
}

/// The result of expanding a value set.
///
/// Expansions are immutable once created; a change to the value set or to
/// any code system it draws from produces a new expansion.
///
/// # Examples
///
/// ```
/// use terminology_types::{ExpansionContains, ExpansionResult};
///
/// let entry = ExpansionContains {
///     system: "http://acme.org".to_string(),
///     version: None,
///     code: "8450-9".to_string(),
///     display: Some("Systolic blood pressure--expiration".to_string()),
/// };
/// let expansion = ExpansionResult::new(vec![entry], 1, 0, None);
///
/// assert!(expansion.contains_code(Some("http://acme.org"), "8450-9"));
/// assert!(!expansion.contains_code(Some("http://other.org"), "8450-9"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExpansionResult {
    /// Unique identifier of this expansion.
    pub identifier: Uuid,
    /// When the expansion was produced.
    pub timestamp: DateTime<Utc>,
    /// Number of codes before the offset/count window was applied.
    pub total: usize,
    /// Applied offset.
    pub offset: usize,
    /// Applied count, if a window was requested.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub count: Option<usize>,
    /// The codes, in emission order.
    pub contains: Vec<ExpansionContains>,
}

impl ExpansionResult {
    /// Creates an expansion stamped with a fresh identifier and timestamp.
    pub fn new(
        contains: Vec<ExpansionContains>,
        total: usize,
        offset: usize,
        count: Option<usize>,
    ) -> Self {
        Self {
            identifier: Uuid::new_v4(),
            timestamp: Utc::now(),
            total,
            offset,
            count,
            contains,
        }
    }

    /// Returns the number of codes in this (possibly windowed) expansion.
    pub fn len(&self) -> usize {
        self.contains.len()
    }

    /// Returns true if the expansion holds no codes.
    pub fn is_empty(&self) -> bool {
        self.contains.is_empty()
    }

    /// Finds the entry for `(system, code)`; a `None` system matches any.
    pub fn find(&self, system: Option<&str>, code: &str) -> Option<&ExpansionContains> {
        self.contains.iter().find(|c| c.matches(system, code))
    }

    /// Returns true if the expansion contains `(system, code)`.
    pub fn contains_code(&self, system: Option<&str>, code: &str) -> bool {
        self.find(system, code).is_some()
    }

    /// Iterates over the codes in order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.contains.iter().map(|c| c.code.as_str())
    }

    /// Compares two expansions ignoring identifier and timestamp.
    pub fn same_contents(&self, other: &Self) -> bool {
        self.total == other.total
            && self.offset == other.offset
            && self.count == other.count
            && self.contains == other.contains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str) -> ExpansionContains {
        ExpansionContains {
            system: "http://cs".to_string(),
            version: None,
            code: code.to_string(),
            display: None,
        }
    }

    #[test]
    fn test_same_contents_ignores_metadata() {
        let a = ExpansionResult::new(vec![entry("A"), entry("B")], 2, 0, None);
        let b = ExpansionResult::new(vec![entry("A"), entry("B")], 2, 0, None);
        assert_ne!(a.identifier, b.identifier);
        assert!(a.same_contents(&b));

        let reordered = ExpansionResult::new(vec![entry("B"), entry("A")], 2, 0, None);
        assert!(!a.same_contents(&reordered));
    }

    #[test]
    fn test_find_without_system() {
        let expansion = ExpansionResult::new(vec![entry("A")], 1, 0, None);
        assert!(expansion.contains_code(None, "A"));
        assert!(!expansion.contains_code(None, "Z"));
        assert_eq!(expansion.codes().collect::<Vec<_>>(), vec!["A"]);
    }
}
