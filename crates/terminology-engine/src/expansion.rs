//! ValueSet expansion.
//!
//! [`Expander`] evaluates a value set's `compose` rules against the
//! registered code systems. Include rules are unioned in order of first
//! appearance, exclude rules are subtracted from the union, and the result
//! is windowed by [`ExpansionParams`].
//!
//! The same rule evaluation answers single-code membership questions
//! ([`Expander::find_member`]) without materializing the whole set. Every
//! rule is resolved and compiled first, so a value set that fails to expand
//! also fails to validate.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use terminology_types::well_known::{PROPERTY_CODE, PROPERTY_CONCEPT, PROPERTY_DISPLAY};
use terminology_types::{
    contains_ignore_case, ConceptSelection, ConceptSet, ExpansionContains, ExpansionResult,
    Filter, FilterOperator, RelationshipKind, ValueSetDefinition,
};
use tracing::debug;

use crate::materializer::content_hash;
use crate::registry::CodeSystemRegistry;
use crate::resource::ResourceStore;
use crate::store::{CodeSystemVersion, ConceptGraph, ConceptId};
use crate::types::{TerminologyError, TerminologyResult};

/// Text filter and paging window of an `$expand` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionParams {
    /// Case-insensitive substring matched against display text.
    pub filter: Option<String>,
    /// Index of the first entry to return.
    pub offset: Option<i64>,
    /// Maximum number of entries to return; `0` means all.
    pub count: Option<i64>,
}

impl ExpansionParams {
    /// Creates params with no filter and no window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the text filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets the offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sets the count.
    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    /// Validates offset and count.
    pub fn window(&self) -> TerminologyResult<Window> {
        let offset = match self.offset {
            Some(offset) if offset < 0 => {
                return Err(TerminologyError::invalid_parameter(format!(
                    "offset parameter for $expand operation must be >= 0 when specified. offset: {offset}"
                )))
            }
            Some(offset) => offset as usize,
            None => 0,
        };
        let count = match self.count {
            Some(count) if count < 0 => {
                return Err(TerminologyError::invalid_parameter(format!(
                    "count parameter for $expand operation must be >= 0 when specified. count: {count}"
                )))
            }
            Some(0) | None => None,
            Some(count) => Some(count as usize),
        };
        Ok(Window { offset, count })
    }

    /// Applies the text filter and window to a full expansion.
    pub fn apply(&self, mut contains: Vec<ExpansionContains>) -> TerminologyResult<ExpansionResult> {
        let window = self.window()?;

        if let Some(text) = self.filter.as_deref().filter(|t| !t.is_empty()) {
            contains.retain(|entry| {
                entry
                    .display
                    .as_deref()
                    .is_some_and(|display| contains_ignore_case(display, text))
            });
        }

        let total = contains.len();
        let (start, end) = window.bounds(total);
        contains.truncate(end);
        contains.drain(..start);

        Ok(ExpansionResult::new(contains, total, window.offset, window.count))
    }
}

/// Validated paging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// First entry returned.
    pub offset: usize,
    /// Entries returned; `None` for everything from `offset` on.
    pub count: Option<usize>,
}

impl Window {
    /// `start..end` within a sequence of `len` entries, clamped to `len`.
    pub fn bounds(self, len: usize) -> (usize, usize) {
        let start = self.offset.min(len);
        let end = match self.count {
            Some(count) => start.saturating_add(count).min(len),
            None => len,
        };
        (start, end)
    }
}

/// A compiled filter predicate over one concept graph.
#[derive(Debug, Clone)]
enum ConceptPredicate {
    IsA(ConceptId),
    DescendentOf(ConceptId),
    IsNotA(ConceptId),
    CodeIn(HashSet<String>),
    CodeNotIn(HashSet<String>),
    CodeMatches(Regex),
    DisplayEquals(String),
    DisplayMatches(Regex),
}

impl ConceptPredicate {
    fn compile(graph: &ConceptGraph, filter: &Filter) -> TerminologyResult<Self> {
        let op = FilterOperator::from_code(&filter.op).ok_or_else(|| {
            TerminologyError::invalid_parameter(format!("Unknown FilterOperator code '{}'", filter.op))
        })?;

        let on_code = matches!(filter.property.as_str(), PROPERTY_CONCEPT | PROPERTY_CODE);
        let on_display = filter.property == PROPERTY_DISPLAY;
        let unsupported = || {
            TerminologyError::invalid_parameter(format!(
                "Filter operator '{}' is not supported for property '{}'",
                op, filter.property
            ))
        };

        let predicate = match op {
            FilterOperator::IsA | FilterOperator::DescendentOf | FilterOperator::IsNotA => {
                if !on_code {
                    return Err(unsupported());
                }
                let anchor = graph.require(&filter.value, "filter")?;
                match op {
                    FilterOperator::IsA => Self::IsA(anchor),
                    FilterOperator::DescendentOf => Self::DescendentOf(anchor),
                    _ => Self::IsNotA(anchor),
                }
            }
            FilterOperator::Equal if on_code => Self::CodeIn(HashSet::from([filter.value.clone()])),
            FilterOperator::Equal if on_display => Self::DisplayEquals(filter.value.clone()),
            FilterOperator::In if on_code => Self::CodeIn(split_codes(&filter.value)),
            FilterOperator::NotIn if on_code => Self::CodeNotIn(split_codes(&filter.value)),
            FilterOperator::Regex if on_code => Self::CodeMatches(full_match(&filter.value)?),
            FilterOperator::Regex if on_display => Self::DisplayMatches(full_match(&filter.value)?),
            _ => return Err(unsupported()),
        };
        Ok(predicate)
    }

    fn matches(&self, graph: &ConceptGraph, id: ConceptId) -> bool {
        let concept = graph.concept(id);
        match self {
            Self::IsA(anchor) => {
                id == *anchor || graph.is_descendant_of(id, *anchor, RelationshipKind::IsA)
            }
            Self::DescendentOf(anchor) => graph.is_descendant_of(id, *anchor, RelationshipKind::IsA),
            Self::IsNotA(anchor) => {
                id != *anchor && !graph.is_descendant_of(id, *anchor, RelationshipKind::IsA)
            }
            Self::CodeIn(codes) => codes.contains(&concept.code),
            Self::CodeNotIn(codes) => !codes.contains(&concept.code),
            Self::CodeMatches(re) => re.is_match(&concept.code),
            Self::DisplayEquals(text) => concept.display.as_deref() == Some(text.as_str()),
            Self::DisplayMatches(re) => concept.display.as_deref().is_some_and(|d| re.is_match(d)),
        }
    }

    /// Candidate concepts in emission order. Hierarchy predicates walk the
    /// graph from their anchor; everything else scans in insertion order.
    fn candidates(&self, graph: &ConceptGraph) -> Vec<ConceptId> {
        match self {
            Self::IsA(anchor) => graph
                .descendants_or_self(*anchor, RelationshipKind::IsA)
                .collect(),
            Self::DescendentOf(anchor) => graph
                .descendants_of(*anchor, RelationshipKind::IsA)
                .collect(),
            _ => graph.concept_ids().filter(|id| self.matches(graph, *id)).collect(),
        }
    }
}

fn split_codes(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

fn full_match(pattern: &str) -> TerminologyResult<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
        TerminologyError::invalid_parameter(format!("Invalid regex filter '{pattern}': {e}"))
    })
}

/// Ordered, deduplicated accumulation of expansion entries.
#[derive(Debug, Default)]
struct Accumulator {
    entries: Vec<ExpansionContains>,
    seen: HashSet<(String, String)>,
}

impl Accumulator {
    fn push(&mut self, entry: ExpansionContains) {
        if self.seen.insert((entry.system.clone(), entry.code.clone())) {
            self.entries.push(entry);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn key(entry: &ExpansionContains) -> (String, String) {
    (entry.system.clone(), entry.code.clone())
}

/// Evaluates compose rules for one request.
///
/// Holds the request's inline code systems and records the revision of every
/// registered code system and the content hash of every value set it
/// consults, so that a materialized result can be checked for freshness
/// later.
pub struct Expander<'a> {
    registry: &'a CodeSystemRegistry,
    resources: &'a dyn ResourceStore,
    inline: Vec<Arc<CodeSystemVersion>>,
    import_chain: Vec<String>,
    consulted: BTreeMap<String, u64>,
    imported: BTreeMap<String, u64>,
    limit: Option<usize>,
}

impl<'a> Expander<'a> {
    /// Creates an expander over the given registry and resource store.
    pub fn new(registry: &'a CodeSystemRegistry, resources: &'a dyn ResourceStore) -> Self {
        Self {
            registry,
            resources,
            inline: Vec::new(),
            import_chain: Vec::new(),
            consulted: BTreeMap::new(),
            imported: BTreeMap::new(),
            limit: None,
        }
    }

    /// Aborts expansions that grow beyond `limit` codes.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `(url, revision)` of every registered code system consulted so far.
    pub fn consulted_revisions(&self) -> &BTreeMap<String, u64> {
        &self.consulted
    }

    /// `(reference, content hash)` of every value set imported so far.
    pub fn imported_value_sets(&self) -> &BTreeMap<String, u64> {
        &self.imported
    }

    /// Consumes the expander, returning the consulted code system revisions
    /// and the imported value set hashes.
    pub fn into_dependencies(self) -> (BTreeMap<String, u64>, BTreeMap<String, u64>) {
        (self.consulted, self.imported)
    }

    /// Expands a value set into its full, unwindowed contents.
    pub fn expand(&mut self, value_set: &ValueSetDefinition) -> TerminologyResult<Vec<ExpansionContains>> {
        self.with_scope(value_set, |this| {
            let mut included = Accumulator::default();
            for rule in &value_set.compose.include {
                for entry in this.evaluate_rule(rule)? {
                    included.push(entry);
                    if let Some(limit) = this.limit.filter(|limit| included.len() > *limit) {
                        return Err(TerminologyError::invalid_parameter(format!(
                            "Expansion of ValueSet produced too many codes (maximum {limit}) - Operation aborted!"
                        )));
                    }
                }
            }

            let mut excluded = HashSet::new();
            for rule in &value_set.compose.exclude {
                excluded.extend(this.evaluate_rule(rule)?.iter().map(key));
            }

            let mut entries = included.entries;
            if !excluded.is_empty() {
                entries.retain(|entry| !excluded.contains(&key(entry)));
            }

            debug!(
                value_set = value_set.label(),
                codes = entries.len(),
                excluded = excluded.len(),
                "Expanded value set"
            );
            Ok(entries)
        })
    }

    /// Finds the entry for `(system, code)` if the value set contains it.
    ///
    /// With no `system`, any system the value set draws from may match.
    /// Fails with the same errors as [`expand`](Self::expand) when any rule
    /// cannot be evaluated, even one that could not contain the code.
    pub fn find_member(
        &mut self,
        value_set: &ValueSetDefinition,
        system: Option<&str>,
        code: &str,
    ) -> TerminologyResult<Option<ExpansionContains>> {
        self.check_compose(value_set)?;
        self.member_of(value_set, system, code)
    }

    fn member_of(
        &mut self,
        value_set: &ValueSetDefinition,
        system: Option<&str>,
        code: &str,
    ) -> TerminologyResult<Option<ExpansionContains>> {
        self.with_scope(value_set, |this| {
            for rule in &value_set.compose.include {
                let Some(candidate) = this.rule_member(rule, system, code)? else {
                    continue;
                };
                let mut excluded = false;
                for exclude in &value_set.compose.exclude {
                    if this.rule_member(exclude, Some(candidate.system.as_str()), code)?.is_some() {
                        excluded = true;
                        break;
                    }
                }
                if !excluded {
                    return Ok(Some(candidate));
                }
            }
            Ok(None)
        })
    }

    /// Runs `f` with the value set's contained code systems in scope and the
    /// value set pushed onto the import chain.
    fn with_scope<T>(
        &mut self,
        value_set: &ValueSetDefinition,
        f: impl FnOnce(&mut Self) -> TerminologyResult<T>,
    ) -> TerminologyResult<T> {
        let label = value_set.label().to_string();
        if value_set.url.is_some() && self.import_chain.contains(&label) {
            let mut chain = self.import_chain.clone();
            chain.push(label);
            return Err(TerminologyError::ValueSetCycle {
                chain: chain.join(" -> "),
            });
        }

        let inline_len = self.inline.len();
        for contained in &value_set.contained {
            let cs = CodeSystemVersion::from_definition(contained)?;
            self.inline.push(Arc::new(cs));
        }
        self.import_chain.push(label);

        let result = f(self);

        self.import_chain.pop();
        self.inline.truncate(inline_len);
        result
    }

    fn resolve_system(&mut self, url: &str, version: Option<&str>) -> TerminologyResult<Arc<CodeSystemVersion>> {
        let found = self
            .inline
            .iter()
            .rev()
            .find(|cs| cs.url() == url && (version.is_none() || cs.version() == version))
            .cloned();
        if let Some(cs) = found {
            return Ok(cs);
        }

        let cs = match self.registry.find_local(url, version) {
            Some(cs) => cs,
            None => match self.load_stored_system(url, version)? {
                Some(cs) => cs,
                None => self.registry.resolve(url, version)?,
            },
        };
        self.consulted.insert(cs.url().to_string(), cs.revision());
        Ok(cs)
    }

    /// Builds and registers a stored CodeSystem resource the registry has
    /// not seen yet.
    fn load_stored_system(
        &self,
        url: &str,
        version: Option<&str>,
    ) -> TerminologyResult<Option<Arc<CodeSystemVersion>>> {
        let Some(definition) = self.resources.load_code_system(url) else {
            return Ok(None);
        };
        if definition.url != url
            || !definition.content.carries_concepts()
            || (version.is_some() && definition.version.as_deref() != version)
        {
            return Ok(None);
        }
        let cs = CodeSystemVersion::from_definition(&definition)?;
        let registered = match definition.id.as_deref() {
            Some(id) => self.registry.register_resource(id, cs).0,
            None => self.registry.register(cs),
        };
        Ok(Some(registered))
    }

    fn load_value_set(&mut self, url: &str) -> TerminologyResult<ValueSetDefinition> {
        let value_set = self
            .resources
            .load_value_set(url)
            .or_else(|| self.registry.built_in_value_set(url).cloned())
            .ok_or_else(|| TerminologyError::unknown_value_set(url))?;
        self.imported.insert(url.to_string(), content_hash(&value_set));
        Ok(value_set)
    }

    /// Resolves every system, explicit code, filter and import of a value
    /// set without collecting entries.
    fn check_compose(&mut self, value_set: &ValueSetDefinition) -> TerminologyResult<()> {
        self.with_scope(value_set, |this| {
            let compose = &value_set.compose;
            for rule in compose.include.iter().chain(&compose.exclude) {
                this.check_rule(rule)?;
            }
            Ok(())
        })
    }

    fn check_rule(&mut self, rule: &ConceptSet) -> TerminologyResult<()> {
        let selection = Self::selection(rule)?;

        for url in &rule.value_sets {
            let value_set = self.load_value_set(url)?;
            self.check_compose(&value_set)?;
        }

        let Some(system) = rule.system.as_deref() else {
            if rule.value_sets.is_empty() {
                return Err(TerminologyError::invalid_parameter(
                    "A ValueSet compose rule must specify a system or a valueSet",
                ));
            }
            if selection != ConceptSelection::All {
                return Err(TerminologyError::invalid_parameter(
                    "A ValueSet compose rule with concepts or filters must name a system",
                ));
            }
            return Ok(());
        };

        let cs = self.resolve_system(system, rule.version.as_deref())?;
        let graph = cs.graph();
        match selection {
            ConceptSelection::All => {}
            ConceptSelection::Codes(references) => {
                for reference in references {
                    graph.require(&reference.code, "concept")?;
                }
            }
            ConceptSelection::Filters(filters) => {
                for filter in filters {
                    ConceptPredicate::compile(graph, filter)?;
                }
            }
        }
        Ok(())
    }

    fn selection<'r>(rule: &'r ConceptSet) -> TerminologyResult<ConceptSelection<'r>> {
        rule.selection().ok_or_else(|| {
            TerminologyError::invalid_parameter(
                "A ValueSet compose rule may list concepts or filters, not both",
            )
        })
    }

    /// Evaluates one include/exclude rule into entries in emission order.
    fn evaluate_rule(&mut self, rule: &ConceptSet) -> TerminologyResult<Vec<ExpansionContains>> {
        let selection = Self::selection(rule)?;

        let mut imported = None;
        if !rule.value_sets.is_empty() {
            let mut union = Accumulator::default();
            for url in &rule.value_sets {
                let value_set = self.load_value_set(url)?;
                for entry in self.expand(&value_set)? {
                    union.push(entry);
                }
            }
            imported = Some(union);
        }

        let Some(system) = rule.system.as_deref() else {
            return match imported {
                Some(union) if selection == ConceptSelection::All => Ok(union.entries),
                Some(_) => Err(TerminologyError::invalid_parameter(
                    "A ValueSet compose rule with concepts or filters must name a system",
                )),
                None => Err(TerminologyError::invalid_parameter(
                    "A ValueSet compose rule must specify a system or a valueSet",
                )),
            };
        };

        let cs = self.resolve_system(system, rule.version.as_deref())?;
        let graph = cs.graph();

        let mut entries = match selection {
            ConceptSelection::All => graph
                .concept_ids()
                .map(|id| cs.expansion_entry(id, None))
                .collect::<Vec<_>>(),
            ConceptSelection::Codes(references) => references
                .iter()
                .map(|reference| -> TerminologyResult<ExpansionContains> {
                    let id = graph.require(&reference.code, "concept")?;
                    Ok(cs.expansion_entry(id, reference.display.as_deref()))
                })
                .collect::<TerminologyResult<Vec<_>>>()?,
            ConceptSelection::Filters(filters) => {
                let predicates = filters
                    .iter()
                    .map(|filter| ConceptPredicate::compile(graph, filter))
                    .collect::<TerminologyResult<Vec<_>>>()?;
                match predicates.split_first() {
                    Some((first, rest)) => first
                        .candidates(graph)
                        .into_iter()
                        .filter(|id| rest.iter().all(|p| p.matches(graph, *id)))
                        .map(|id| cs.expansion_entry(id, None))
                        .collect(),
                    None => Vec::new(),
                }
            }
        };

        if let Some(union) = imported {
            entries.retain(|entry| union.seen.contains(&key(entry)));
        }
        Ok(entries)
    }

    /// Single-code form of [`evaluate_rule`](Self::evaluate_rule).
    fn rule_member(
        &mut self,
        rule: &ConceptSet,
        system: Option<&str>,
        code: &str,
    ) -> TerminologyResult<Option<ExpansionContains>> {
        let selection = Self::selection(rule)?;

        let member = match rule.system.as_deref() {
            Some(rule_system) if system.is_some_and(|s| s != rule_system) => return Ok(None),
            Some(rule_system) => {
                let cs = self.resolve_system(rule_system, rule.version.as_deref())?;
                let graph = cs.graph();
                let found = match graph.find_concept(code) {
                    Some(id) => match selection {
                        ConceptSelection::All => Some(cs.expansion_entry(id, None)),
                        ConceptSelection::Codes(references) => references
                            .iter()
                            .find(|reference| reference.code == code)
                            .map(|reference| cs.expansion_entry(id, reference.display.as_deref())),
                        ConceptSelection::Filters(filters) => {
                            let predicates = filters
                                .iter()
                                .map(|filter| ConceptPredicate::compile(graph, filter))
                                .collect::<TerminologyResult<Vec<_>>>()?;
                            predicates
                                .iter()
                                .all(|p| p.matches(graph, id))
                                .then(|| cs.expansion_entry(id, None))
                        }
                    },
                    None => None,
                };
                match found {
                    Some(entry) => entry,
                    None => return Ok(None),
                }
            }
            None if rule.value_sets.is_empty() => {
                return Err(TerminologyError::invalid_parameter(
                    "A ValueSet compose rule must specify a system or a valueSet",
                ))
            }
            None if selection != ConceptSelection::All => {
                return Err(TerminologyError::invalid_parameter(
                    "A ValueSet compose rule with concepts or filters must name a system",
                ))
            }
            None => {
                return self.imported_member(&rule.value_sets, system, code);
            }
        };

        if rule.value_sets.is_empty() {
            return Ok(Some(member));
        }
        let imported = self.imported_member(&rule.value_sets, Some(member.system.as_str()), code)?;
        Ok(imported.map(|_| member))
    }

    fn imported_member(
        &mut self,
        urls: &[String],
        system: Option<&str>,
        code: &str,
    ) -> TerminologyResult<Option<ExpansionContains>> {
        for url in urls {
            let value_set = self.load_value_set(url)?;
            if let Some(entry) = self.member_of(&value_set, system, code)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}
