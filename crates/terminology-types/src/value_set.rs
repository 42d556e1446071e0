//! Value set resource definition and compose rules.
//!
//! A value set is defined by its `compose`: ordered include rules whose
//! results are unioned, followed by exclude rules that are subtracted from
//! the union. Each rule (`ConceptSet`) selects concepts from one code system
//! and may additionally import other value sets.

use crate::CodeSystemDefinition;

/// A value set resource as held by the resource store.
///
/// # Examples
///
/// ```
/// use terminology_types::{ConceptSet, Filter, ValueSetDefinition};
///
/// let vs = ValueSetDefinition::new("http://example.com/my_value_set")
///     .with_include(
///         ConceptSet::system("http://example.com/my_code_system")
///             .with_filter(Filter::is_a("ParentA")),
///     );
///
/// assert_eq!(vs.compose.include.len(), 1);
/// assert!(vs.compose.exclude.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueSetDefinition {
    /// Logical resource id.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub id: Option<String>,
    /// Canonical URL of the value set.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub url: Option<String>,
    /// Business version.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub version: Option<String>,
    /// Computer friendly name.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    /// Content logical definition.
    #[cfg_attr(feature = "serde", serde(default))]
    pub compose: Compose,
    /// Code systems carried inline with this value set.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub contained: Vec<CodeSystemDefinition>,
}

impl ValueSetDefinition {
    /// Creates an empty value set with the given canonical URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Synthesizes the implicit "all codes of `system`" value set.
    pub fn all_codes_of(system: impl Into<String>) -> Self {
        Self::default().with_include(ConceptSet::system(system))
    }

    /// Sets the logical id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Appends an include rule.
    pub fn with_include(mut self, rule: ConceptSet) -> Self {
        self.compose.include.push(rule);
        self
    }

    /// Appends an exclude rule.
    pub fn with_exclude(mut self, rule: ConceptSet) -> Self {
        self.compose.exclude.push(rule);
        self
    }

    /// Appends an inline code system.
    pub fn with_contained(mut self, code_system: CodeSystemDefinition) -> Self {
        self.contained.push(code_system);
        self
    }

    /// Identity used to key pre-expansion snapshots: the id, else the URL.
    pub fn identity(&self) -> Option<&str> {
        self.id.as_deref().or(self.url.as_deref())
    }

    /// Returns a label for log and error messages.
    pub fn label(&self) -> &str {
        self.url
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<inline>")
    }
}

/// The compose element of a value set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Compose {
    /// Include rules, unioned in order.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub include: Vec<ConceptSet>,
    /// Exclude rules, subtracted after all includes.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub exclude: Vec<ConceptSet>,
}

impl Compose {
    /// Iterates over every rule with its direction, includes first.
    pub fn rules(&self) -> impl Iterator<Item = ComposeRule<'_>> {
        self.include
            .iter()
            .map(ComposeRule::Include)
            .chain(self.exclude.iter().map(ComposeRule::Exclude))
    }
}

/// A compose rule tagged with its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeRule<'a> {
    /// Concepts selected by the set are added.
    Include(&'a ConceptSet),
    /// Concepts selected by the set are removed.
    Exclude(&'a ConceptSet),
}

impl<'a> ComposeRule<'a> {
    /// Returns the concept set of the rule.
    pub fn concept_set(self) -> &'a ConceptSet {
        match self {
            Self::Include(set) | Self::Exclude(set) => set,
        }
    }
}

/// One include or exclude rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ConceptSet {
    /// Code system the concepts are drawn from.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub system: Option<String>,
    /// Specific code system version.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub version: Option<String>,
    /// Explicitly listed concepts.
    #[cfg_attr(
        feature = "serde",
        serde(default, rename = "concept", skip_serializing_if = "Vec::is_empty")
    )]
    pub concepts: Vec<ConceptReference>,
    /// Filters, all of which must hold.
    #[cfg_attr(
        feature = "serde",
        serde(default, rename = "filter", skip_serializing_if = "Vec::is_empty")
    )]
    pub filters: Vec<Filter>,
    /// Canonical URLs of imported value sets.
    #[cfg_attr(
        feature = "serde",
        serde(default, rename = "valueSet", skip_serializing_if = "Vec::is_empty")
    )]
    pub value_sets: Vec<String>,
}

impl ConceptSet {
    /// Creates a rule selecting from `system`.
    pub fn system(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..Default::default()
        }
    }

    /// Creates a rule that only imports another value set.
    pub fn value_set(url: impl Into<String>) -> Self {
        Self {
            value_sets: vec![url.into()],
            ..Default::default()
        }
    }

    /// Pins the code system version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Appends an explicit concept.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.concepts.push(ConceptReference {
            code: code.into(),
            display: None,
        });
        self
    }

    /// Appends a filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Appends a value set import.
    pub fn with_value_set(mut self, url: impl Into<String>) -> Self {
        self.value_sets.push(url.into());
        self
    }

    /// Classifies how this rule selects concepts from its system.
    ///
    /// Returns `None` when the rule lists both explicit concepts and filters.
    pub fn selection(&self) -> Option<ConceptSelection<'_>> {
        match (self.concepts.is_empty(), self.filters.is_empty()) {
            (true, true) => Some(ConceptSelection::All),
            (false, true) => Some(ConceptSelection::Codes(&self.concepts)),
            (true, false) => Some(ConceptSelection::Filters(&self.filters)),
            (false, false) => None,
        }
    }
}

/// How a concept set selects concepts from its code system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConceptSelection<'a> {
    /// Every concept of the system.
    All,
    /// Exactly the listed codes.
    Codes(&'a [ConceptReference]),
    /// Concepts satisfying every filter.
    Filters(&'a [Filter]),
}

/// An explicitly listed concept in a compose rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptReference {
    /// Code from the rule's system.
    pub code: String,
    /// Display override.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub display: Option<String>,
}

/// A `(property, op, value)` compose filter.
///
/// The operator is kept as its raw code; see [`FilterOperator`](crate::FilterOperator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Filter {
    /// Property the filter applies to (`concept`, `code`, `display`).
    pub property: String,
    /// Operator code.
    pub op: String,
    /// Filter value.
    pub value: String,
}

impl Filter {
    /// Creates a filter.
    pub fn new(
        property: impl Into<String>,
        op: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            op: op.into(),
            value: value.into(),
        }
    }

    /// Creates a `concept is-a value` filter.
    pub fn is_a(value: impl Into<String>) -> Self {
        Self::new("concept", "is-a", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_variants() {
        let all = ConceptSet::system("http://cs");
        assert_eq!(all.selection(), Some(ConceptSelection::All));

        let codes = ConceptSet::system("http://cs").with_code("A");
        assert!(matches!(codes.selection(), Some(ConceptSelection::Codes(c)) if c.len() == 1));

        let filters = ConceptSet::system("http://cs").with_filter(Filter::is_a("A"));
        assert!(matches!(filters.selection(), Some(ConceptSelection::Filters(_))));

        let both = ConceptSet::system("http://cs")
            .with_code("A")
            .with_filter(Filter::is_a("A"));
        assert_eq!(both.selection(), None);
    }

    #[test]
    fn test_rules_are_tagged_in_order() {
        let vs = ValueSetDefinition::new("http://vs")
            .with_exclude(ConceptSet::system("http://x"))
            .with_include(ConceptSet::system("http://a"))
            .with_include(ConceptSet::system("http://b"));

        let tags: Vec<_> = vs
            .compose
            .rules()
            .map(|rule| match rule {
                ComposeRule::Include(set) => format!("+{}", set.system.as_deref().unwrap()),
                ComposeRule::Exclude(set) => format!("-{}", set.system.as_deref().unwrap()),
            })
            .collect();

        assert_eq!(tags, vec!["+http://a", "+http://b", "-http://x"]);
    }

    #[test]
    fn test_identity_prefers_id() {
        let vs = ValueSetDefinition::new("http://vs").with_id("vs");
        assert_eq!(vs.identity(), Some("vs"));
        assert_eq!(vs.label(), "http://vs");

        let inline = ValueSetDefinition::default();
        assert_eq!(inline.identity(), None);
        assert_eq!(inline.label(), "<inline>");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_compose() {
        let json = r#"{
            "resourceType": "ValueSet",
            "url": "http://www.healthintersections.com.au/fhir/ValueSet/extensional-case-2",
            "compose": {
                "include": [{
                    "system": "http://acme.org",
                    "concept": [{"code": "8450-9"}, {"code": "11378-7"}]
                }],
                "exclude": [{
                    "system": "http://acme.org",
                    "filter": [{"property": "concept", "op": "is-a", "value": "8450-9"}]
                }]
            }
        }"#;

        let vs: ValueSetDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(vs.compose.include[0].concepts.len(), 2);
        assert_eq!(vs.compose.exclude[0].filters[0].op, "is-a");
    }
}
