//! Code system resource definition.
//!
//! This module provides `CodeSystemDefinition`, the loadable shape of a code
//! system resource. Nested `concept` elements express the ISA hierarchy.

use crate::CodeSystemContentMode;

/// A code system resource as held by the resource store.
///
/// # Examples
///
/// ```
/// use terminology_types::{CodeSystemDefinition, ConceptDefinition};
///
/// let cs = CodeSystemDefinition::new("http://example.com/cs")
///     .with_concept(
///         ConceptDefinition::new("A", "Code A")
///             .with_child(ConceptDefinition::new("AA", "Code AA")),
///     );
///
/// assert_eq!(cs.concept_count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct CodeSystemDefinition {
    /// Logical resource id.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub id: Option<String>,
    /// Canonical URL of the code system.
    pub url: String,
    /// Business version.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub version: Option<String>,
    /// Computer friendly name.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    /// How much of the code system is present in this resource.
    #[cfg_attr(feature = "serde", serde(default))]
    pub content: CodeSystemContentMode,
    /// Top-level concepts. Children are nested.
    #[cfg_attr(
        feature = "serde",
        serde(default, rename = "concept", skip_serializing_if = "Vec::is_empty")
    )]
    pub concepts: Vec<ConceptDefinition>,
}

impl CodeSystemDefinition {
    /// Creates an empty `complete` code system with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the logical id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the business version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the content mode.
    pub fn with_content(mut self, content: CodeSystemContentMode) -> Self {
        self.content = content;
        self
    }

    /// Appends a top-level concept.
    pub fn with_concept(mut self, concept: ConceptDefinition) -> Self {
        self.concepts.push(concept);
        self
    }

    /// Counts all concepts, including nested children.
    pub fn concept_count(&self) -> usize {
        fn count(concepts: &[ConceptDefinition]) -> usize {
            concepts.iter().map(|c| 1 + count(&c.concepts)).sum()
        }
        count(&self.concepts)
    }
}

/// A concept element of a code system resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptDefinition {
    /// Code of the concept.
    pub code: String,
    /// Display text.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub display: Option<String>,
    /// Child concepts (ISA).
    #[cfg_attr(
        feature = "serde",
        serde(default, rename = "concept", skip_serializing_if = "Vec::is_empty")
    )]
    pub concepts: Vec<ConceptDefinition>,
}

impl ConceptDefinition {
    /// Creates a concept with a display.
    pub fn new(code: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display: Some(display.into()),
            concepts: Vec::new(),
        }
    }

    /// Appends a child concept.
    pub fn with_child(mut self, child: ConceptDefinition) -> Self {
        self.concepts.push(child);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_count_includes_children() {
        let cs = CodeSystemDefinition::new("http://example.com/cs")
            .with_concept(
                ConceptDefinition::new("A", "Code A")
                    .with_child(
                        ConceptDefinition::new("AA", "Code AA")
                            .with_child(ConceptDefinition::new("AAA", "Code AAA")),
                    )
                    .with_child(ConceptDefinition::new("AB", "Code AB")),
            )
            .with_concept(ConceptDefinition::new("B", "Code B"));

        assert_eq!(cs.concept_count(), 5);
        assert_eq!(cs.content, CodeSystemContentMode::Complete);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_fhir_json() {
        let json = r#"{
            "resourceType": "CodeSystem",
            "id": "cs",
            "url": "http://acme.org",
            "content": "complete",
            "concept": [
                {"code": "8450-9", "display": "Systolic blood pressure--expiration",
                 "concept": [{"code": "8451-7"}]}
            ]
        }"#;

        let cs: CodeSystemDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(cs.id.as_deref(), Some("cs"));
        assert_eq!(cs.concepts[0].concepts[0].code, "8451-7");
        assert_eq!(cs.concept_count(), 2);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_not_present() {
        let json = r#"{"url": "http://example.com/my_code_system", "content": "not-present"}"#;
        let cs: CodeSystemDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(cs.content, CodeSystemContentMode::NotPresent);
        assert!(cs.concepts.is_empty());
    }
}
