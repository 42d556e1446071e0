//! Terminology enumeration types.
//!
//! This module provides enum representations for the coded values used by
//! code systems and value set compose rules, such as the content mode of a
//! code system and the operator of a compose filter.

/// Content mode of a code system resource.
///
/// Only `complete` code systems carry their concepts inline. A `not-present`
/// code system is an external system whose concepts are registered
/// separately.
///
/// # Examples
///
/// ```
/// use terminology_types::CodeSystemContentMode;
///
/// let mode = CodeSystemContentMode::from_code("not-present");
/// assert_eq!(mode, Some(CodeSystemContentMode::NotPresent));
/// assert!(!CodeSystemContentMode::NotPresent.carries_concepts());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CodeSystemContentMode {
    /// All concepts are present in the resource.
    #[default]
    Complete,
    /// No concepts are present; the system is maintained externally.
    NotPresent,
    /// Only a subset of concepts is present.
    Fragment,
    /// A sample of concepts is present.
    Example,
    /// Concepts supplement another code system.
    Supplement,
}

impl CodeSystemContentMode {
    /// Creates a content mode from its FHIR code.
    ///
    /// Returns `None` if the code is not recognized.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "complete" => Some(Self::Complete),
            "not-present" => Some(Self::NotPresent),
            "fragment" => Some(Self::Fragment),
            "example" => Some(Self::Example),
            "supplement" => Some(Self::Supplement),
            _ => None,
        }
    }

    /// Returns the FHIR code for this content mode.
    pub fn code(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::NotPresent => "not-present",
            Self::Fragment => "fragment",
            Self::Example => "example",
            Self::Supplement => "supplement",
        }
    }

    /// Returns true if a resource with this mode can be turned into a
    /// concept graph from its own `concept` elements.
    pub fn carries_concepts(self) -> bool {
        matches!(self, Self::Complete | Self::Fragment | Self::Example)
    }
}

/// Operator of a value set compose filter.
///
/// Filters are stored with their raw operator code so that an unknown code
/// is reported when the filter is evaluated, not when it is parsed.
///
/// # Examples
///
/// ```
/// use terminology_types::FilterOperator;
///
/// assert_eq!(FilterOperator::from_code("is-a"), Some(FilterOperator::IsA));
/// assert_eq!(FilterOperator::from_code("n"), None);
/// assert!(FilterOperator::IsNotA.is_hierarchical());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Property equals the value.
    Equal,
    /// The concept named by value and all of its descendants.
    IsA,
    /// Descendants of the concept named by value, excluding the concept itself.
    DescendentOf,
    /// Every concept that is not `is-a` the value.
    IsNotA,
    /// Property matches the value as a regular expression.
    Regex,
    /// Property is one of a comma-separated list of values.
    In,
    /// Property is not one of a comma-separated list of values.
    NotIn,
    /// The concept named by value and all of its ancestors.
    Generalizes,
    /// Property exists (or not).
    Exists,
}

impl FilterOperator {
    /// Creates a filter operator from its FHIR code.
    ///
    /// Returns `None` if the code is not recognized.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "=" => Some(Self::Equal),
            "is-a" => Some(Self::IsA),
            "descendent-of" => Some(Self::DescendentOf),
            "is-not-a" => Some(Self::IsNotA),
            "regex" => Some(Self::Regex),
            "in" => Some(Self::In),
            "not-in" => Some(Self::NotIn),
            "generalizes" => Some(Self::Generalizes),
            "exists" => Some(Self::Exists),
            _ => None,
        }
    }

    /// Returns the FHIR code for this operator.
    pub fn code(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::IsA => "is-a",
            Self::DescendentOf => "descendent-of",
            Self::IsNotA => "is-not-a",
            Self::Regex => "regex",
            Self::In => "in",
            Self::NotIn => "not-in",
            Self::Generalizes => "generalizes",
            Self::Exists => "exists",
        }
    }

    /// Returns true if the operator is evaluated against the concept hierarchy.
    pub fn is_hierarchical(self) -> bool {
        matches!(
            self,
            Self::IsA | Self::DescendentOf | Self::IsNotA | Self::Generalizes
        )
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_operator_roundtrip_codes() {
        for op in [
            FilterOperator::Equal,
            FilterOperator::IsA,
            FilterOperator::DescendentOf,
            FilterOperator::IsNotA,
            FilterOperator::Regex,
            FilterOperator::In,
            FilterOperator::NotIn,
            FilterOperator::Generalizes,
            FilterOperator::Exists,
        ] {
            assert_eq!(FilterOperator::from_code(op.code()), Some(op));
        }
    }

    #[test]
    fn test_unknown_filter_operator() {
        assert_eq!(FilterOperator::from_code("n"), None);
        assert_eq!(FilterOperator::from_code("IS-A"), None);
    }

    #[test]
    fn test_content_mode_carries_concepts() {
        assert!(CodeSystemContentMode::Complete.carries_concepts());
        assert!(!CodeSystemContentMode::NotPresent.carries_concepts());
        assert!(!CodeSystemContentMode::Supplement.carries_concepts());
        assert_eq!(CodeSystemContentMode::default(), CodeSystemContentMode::Complete);
    }
}
