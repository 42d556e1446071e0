//! # terminology-types
//!
//! Type definitions for code systems, value sets and their expansions.
//!
//! This crate provides the plain data model shared by the terminology
//! engine: code system and value set definitions as they are loaded from
//! resources, the compose rules that define a value set, and the results of
//! `$expand` and `$validate-code`.
//!
//! ## Features
//!
//! - `serde` (default): Enables serialization/deserialization support via serde,
//!   using the FHIR JSON field names (`concept`, `filter`, `valueSet`, ...).
//!
//! ## Usage
//!
//! ```rust
//! use terminology_types::{ConceptSet, Filter, FilterOperator, ValueSetDefinition};
//! use terminology_types::well_known;
//!
//! // A value set of everything under ParentA
//! let vs = ValueSetDefinition::new("http://example.com/my_value_set")
//!     .with_include(
//!         ConceptSet::system("http://example.com/my_code_system")
//!             .with_filter(Filter::is_a("ParentA")),
//!     );
//!
//! let op = FilterOperator::from_code(&vs.compose.include[0].filters[0].op);
//! assert_eq!(op, Some(FilterOperator::IsA));
//!
//! // Built-in systems are always available
//! let marital_status: &str = well_known::V3_MARITAL_STATUS;
//! # let _ = marital_status;
//! ```

#![warn(missing_docs)]

mod code_system;
mod concept;
mod enums;
mod expansion;
mod relationship;
mod validation;
mod value_set;
pub mod well_known;

// Re-export all public types at crate root
pub use code_system::{CodeSystemDefinition, ConceptDefinition};
pub use concept::{contains_ignore_case, Concept};
pub use enums::{CodeSystemContentMode, FilterOperator};
pub use expansion::{ExpansionContains, ExpansionResult};
pub use relationship::RelationshipKind;
pub use validation::ValidationResult;
pub use value_set::{
    ComposeRule, Compose, ConceptReference, ConceptSelection, ConceptSet, Filter,
    ValueSetDefinition,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_are_exported() {
        // Verify all types are accessible from crate root
        let _mode = CodeSystemContentMode::NotPresent;
        let _op = FilterOperator::IsA;
        let _kind = RelationshipKind::IsA;
        let _result = ValidationResult::success(None);
        let _concept = Concept::new("A", Some("Code A"));
    }

    #[test]
    fn test_well_known_accessible() {
        assert_eq!(
            well_known::V3_MARITAL_STATUS,
            "http://terminology.hl7.org/CodeSystem/v3-MaritalStatus"
        );
        assert_eq!(
            well_known::VS_YES_NO_DONT_KNOW,
            "http://hl7.org/fhir/ValueSet/yesnodontknow"
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let vs = ValueSetDefinition::new("http://myvs")
            .with_id("vs")
            .with_include(ConceptSet::system("http://mycs").with_filter(Filter::is_a("ParentA")));

        let json = serde_json::to_string(&vs).unwrap();
        let parsed: ValueSetDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(vs, parsed);
    }
}
