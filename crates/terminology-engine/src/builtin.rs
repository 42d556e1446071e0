//! Code systems and value sets that ship with the engine.
//!
//! These are always resolvable, even with an empty resource store, and are
//! consulted after inline and locally stored code systems.

use terminology_types::well_known::{
    ADMINISTRATIVE_GENDER, DATA_ABSENT_REASON, V2_0136, V3_MARITAL_STATUS,
    VS_ADMINISTRATIVE_GENDER, VS_MARITAL_STATUS, VS_YES_NO_DONT_KNOW,
};
use terminology_types::{CodeSystemContentMode, ConceptSet, ValueSetDefinition};

use crate::store::CodeSystemVersion;
use crate::types::TerminologyResult;

/// `(code, display, parent)` rows of a built-in code system.
type Rows = &'static [(&'static str, &'static str, Option<&'static str>)];

const MARITAL_STATUS: Rows = &[
    ("A", "Annulled", None),
    ("C", "Common Law", None),
    ("D", "Divorced", None),
    ("I", "Interlocutory", None),
    ("L", "Legally Separated", None),
    ("M", "Married", None),
    ("P", "Polygamous", None),
    ("S", "Never Married", None),
    ("T", "Domestic partner", None),
    ("U", "unmarried", None),
    ("W", "Widowed", None),
];

const YES_NO: Rows = &[("Y", "Yes", None), ("N", "No", None)];

const ABSENT_REASON: Rows = &[
    ("unknown", "Unknown", None),
    ("asked-unknown", "Asked But Unknown", Some("unknown")),
    ("temp-unknown", "Temporarily Unknown", Some("asked-unknown")),
    ("asked-declined", "Asked But Declined", Some("asked-unknown")),
    ("not-asked", "Not Asked", Some("unknown")),
    ("masked", "Masked", None),
    ("not-applicable", "Not Applicable", None),
    ("unsupported", "Unsupported", None),
    ("as-text", "As Text", None),
    ("error", "Error", None),
    ("not-a-number", "Not a Number (NaN)", Some("error")),
    ("negative-infinity", "Negative Infinity (NINF)", Some("error")),
    ("positive-infinity", "Positive Infinity (PINF)", Some("error")),
    ("not-performed", "Not Performed", None),
    ("not-permitted", "Not Permitted", None),
];

const GENDER: Rows = &[
    ("male", "Male", None),
    ("female", "Female", None),
    ("other", "Other", None),
    ("unknown", "Unknown", None),
];

fn build(url: &str, name: &str, rows: Rows) -> TerminologyResult<CodeSystemVersion> {
    let mut cs = CodeSystemVersion::new(
        url,
        None,
        Some(name.to_string()),
        CodeSystemContentMode::Complete,
    );
    for (code, display, parent) in rows {
        let parents: Vec<&str> = parent.iter().copied().collect();
        cs.add_concept(*code, Some(*display), &parents)?;
    }
    Ok(cs)
}

/// Builds every built-in code system.
pub fn built_in_code_systems() -> TerminologyResult<Vec<CodeSystemVersion>> {
    Ok(vec![
        build(V3_MARITAL_STATUS, "MaritalStatus", MARITAL_STATUS)?,
        build(V2_0136, "YesNoIndicator", YES_NO)?,
        build(DATA_ABSENT_REASON, "DataAbsentReason", ABSENT_REASON)?,
        build(ADMINISTRATIVE_GENDER, "AdministrativeGender", GENDER)?,
    ])
}

/// Returns every built-in value set.
pub fn built_in_value_sets() -> Vec<ValueSetDefinition> {
    vec![
        ValueSetDefinition::new(VS_YES_NO_DONT_KNOW)
            .with_id("yesnodontknow")
            .with_include(ConceptSet::system(V2_0136).with_code("Y").with_code("N"))
            .with_include(ConceptSet::system(DATA_ABSENT_REASON).with_code("asked-unknown")),
        ValueSetDefinition::new(VS_MARITAL_STATUS)
            .with_id("marital-status")
            .with_include(ConceptSet::system(V3_MARITAL_STATUS)),
        ValueSetDefinition::new(VS_ADMINISTRATIVE_GENDER)
            .with_id("administrative-gender")
            .with_include(ConceptSet::system(ADMINISTRATIVE_GENDER)),
    ]
}
