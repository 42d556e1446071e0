//! Well-known code system and value set URLs.
//!
//! This module provides constants for the canonical URLs of the code systems
//! and value sets that ship with the engine, so they can be expanded and
//! validated against without being loaded first.
//!
//! # Examples
//!
//! ```
//! use terminology_types::well_known;
//!
//! assert_eq!(
//!     well_known::V2_0136,
//!     "http://terminology.hl7.org/CodeSystem/v2-0136"
//! );
//! assert!(well_known::BUILT_IN_CODE_SYSTEMS.contains(&well_known::V3_MARITAL_STATUS));
//! ```

// =============================================================================
// Code Systems
// =============================================================================

/// HL7 v3 marital status codes (`M`, `S`, `D`, ...).
pub const V3_MARITAL_STATUS: &str = "http://terminology.hl7.org/CodeSystem/v3-MaritalStatus";

/// HL7 v2 table 0136, yes/no indicator (`Y`, `N`).
pub const V2_0136: &str = "http://terminology.hl7.org/CodeSystem/v2-0136";

/// Reasons a data element is absent.
pub const DATA_ABSENT_REASON: &str = "http://terminology.hl7.org/CodeSystem/data-absent-reason";

/// Administrative gender.
pub const ADMINISTRATIVE_GENDER: &str = "http://hl7.org/fhir/administrative-gender";

/// All built-in code system URLs.
pub const BUILT_IN_CODE_SYSTEMS: &[&str] = &[
    V3_MARITAL_STATUS,
    V2_0136,
    DATA_ABSENT_REASON,
    ADMINISTRATIVE_GENDER,
];

// =============================================================================
// Value Sets
// =============================================================================

/// Yes / No / Don't know.
pub const VS_YES_NO_DONT_KNOW: &str = "http://hl7.org/fhir/ValueSet/yesnodontknow";

/// Marital status.
pub const VS_MARITAL_STATUS: &str = "http://hl7.org/fhir/ValueSet/marital-status";

/// Administrative gender.
pub const VS_ADMINISTRATIVE_GENDER: &str = "http://hl7.org/fhir/ValueSet/administrative-gender";

/// All built-in value set URLs.
pub const BUILT_IN_VALUE_SETS: &[&str] = &[
    VS_YES_NO_DONT_KNOW,
    VS_MARITAL_STATUS,
    VS_ADMINISTRATIVE_GENDER,
];

// =============================================================================
// Filter Properties
// =============================================================================

/// Filter property naming the concept itself.
pub const PROPERTY_CONCEPT: &str = "concept";

/// Filter property naming the code (synonym of `concept`).
pub const PROPERTY_CODE: &str = "code";

/// Filter property naming the display text.
pub const PROPERTY_DISPLAY: &str = "display";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_in_urls_are_distinct() {
        let mut urls: Vec<&str> = BUILT_IN_CODE_SYSTEMS
            .iter()
            .chain(BUILT_IN_VALUE_SETS)
            .copied()
            .collect();
        let before = urls.len();
        urls.sort_unstable();
        urls.dedup();
        assert_eq!(urls.len(), before);
    }
}
