//! Concept relationship kinds.
//!
//! This module provides the `RelationshipKind` enum that types the
//! parent/child links of a concept graph.

/// The kind of a parent/child link between two concepts.
///
/// Only `IsA` links are followed by hierarchy filters; `PartOf` links are
/// kept in the graph but never traversed by `is-a` evaluation.
///
/// # Examples
///
/// ```
/// use terminology_types::RelationshipKind;
///
/// assert!(RelationshipKind::IsA.is_is_a());
/// assert_eq!(RelationshipKind::from_code("part-of"), Some(RelationshipKind::PartOf));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum RelationshipKind {
    /// Subsumption: the child is a kind of the parent.
    #[default]
    IsA,
    /// Partonomy: the child is a part of the parent.
    PartOf,
}

impl RelationshipKind {
    /// Creates a relationship kind from its code.
    ///
    /// Returns `None` if the code is not recognized.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "is-a" | "isa" | "ISA" => Some(Self::IsA),
            "part-of" | "PART_OF" => Some(Self::PartOf),
            _ => None,
        }
    }

    /// Returns true if this is an IS_A (subtype) relationship.
    pub fn is_is_a(self) -> bool {
        self == Self::IsA
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_kind_codes() {
        assert_eq!(RelationshipKind::from_code("isa"), Some(RelationshipKind::IsA));
        assert_eq!(RelationshipKind::from_code("ISA"), Some(RelationshipKind::IsA));
        assert_eq!(RelationshipKind::from_code("sibling"), None);
    }

    #[test]
    fn test_relationship_kind_default() {
        assert!(RelationshipKind::default().is_is_a());
        assert!(!RelationshipKind::PartOf.is_is_a());
    }
}
