//! In-memory concept graph store.
//!
//! Holds the concepts of one code system version in an arena addressed by
//! [`ConceptId`]. Parent/child links form a DAG: a concept may have several
//! ISA parents, and every traversal keeps a visited set of arena indices so
//! that shared descendants are emitted once.
//!
//! ```ignore
//! let mut cs = CodeSystemVersion::new("http://example.com/cs", None, None, CodeSystemContentMode::Complete);
//! let parent = cs.add_concept("ParentA", Some("Parent A"), &[])?;
//! cs.add_concept("childAA", Some("Child AA"), &["ParentA"])?;
//!
//! let codes: Vec<_> = cs.graph().descendants_of(parent, RelationshipKind::IsA)
//!     .map(|id| &cs.graph().concept(id).code)
//!     .collect();
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use terminology_types::{
    CodeSystemContentMode, CodeSystemDefinition, Concept, ConceptDefinition, ExpansionContains,
    RelationshipKind,
};

use crate::types::{TerminologyError, TerminologyResult};

/// Stable index of a concept within one [`ConceptGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConceptId(u32);

impl ConceptId {
    /// Returns the arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct ConceptNode {
    concept: Concept,
    parents: Vec<(ConceptId, RelationshipKind)>,
    children: Vec<(ConceptId, RelationshipKind)>,
}

/// Arena of concepts with typed parent/child links.
#[derive(Clone)]
pub struct ConceptGraph {
    /// URL of the owning code system, used in error messages.
    system: String,
    /// Concepts in insertion order.
    nodes: Vec<ConceptNode>,
    /// Code -> arena index.
    by_code: HashMap<String, ConceptId>,
}

impl std::fmt::Debug for ConceptGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptGraph")
            .field("system", &self.system)
            .field("concepts", &self.nodes.len())
            .field("links", &self.link_count())
            .finish()
    }
}

impl ConceptGraph {
    /// Creates an empty graph for the given code system URL.
    pub fn new(system: impl Into<String>) -> Self {
        Self::with_capacity(system, 0)
    }

    /// Creates a graph with pre-allocated capacity.
    pub fn with_capacity(system: impl Into<String>, concept_count: usize) -> Self {
        Self {
            system: system.into(),
            nodes: Vec::with_capacity(concept_count),
            by_code: HashMap::with_capacity(concept_count),
        }
    }

    /// Returns the URL of the owning code system.
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Adds a concept under the given ISA parents.
    ///
    /// Every parent must already exist. Codes are unique per graph.
    pub fn add_concept(
        &mut self,
        code: impl Into<String>,
        display: Option<String>,
        parent_codes: &[&str],
    ) -> TerminologyResult<ConceptId> {
        let code = code.into();
        if self.by_code.contains_key(&code) {
            return Err(TerminologyError::DuplicateConcept {
                system: self.system.clone(),
                code,
            });
        }

        let parents = parent_codes
            .iter()
            .map(|parent| self.require(parent, "parent"))
            .collect::<TerminologyResult<Vec<_>>>()?;

        let id = ConceptId(self.nodes.len() as u32);
        self.nodes.push(ConceptNode {
            concept: Concept { code: code.clone(), display },
            parents: Vec::with_capacity(parents.len()),
            children: Vec::new(),
        });
        self.by_code.insert(code, id);

        for parent in parents {
            self.add_child_link(parent, id, RelationshipKind::IsA);
        }

        Ok(id)
    }

    /// Links `child` under `parent`. Repeated and self links are ignored.
    pub fn add_child_link(&mut self, parent: ConceptId, child: ConceptId, kind: RelationshipKind) {
        if parent == child
            || self.nodes[parent.index()]
                .children
                .contains(&(child, kind))
        {
            return;
        }
        self.nodes[parent.index()].children.push((child, kind));
        self.nodes[child.index()].parents.push((parent, kind));
    }

    /// Links two existing concepts by code.
    pub fn link_codes(
        &mut self,
        parent_code: &str,
        child_code: &str,
        kind: RelationshipKind,
    ) -> TerminologyResult<()> {
        let parent = self.require(parent_code, "parent")?;
        let child = self.require(child_code, "child")?;
        self.add_child_link(parent, child, kind);
        Ok(())
    }

    /// Finds a concept by code.
    pub fn find_concept(&self, code: &str) -> Option<ConceptId> {
        self.by_code.get(code).copied()
    }

    /// Finds a concept by code, failing with `UnknownConcept`.
    pub fn require(&self, code: &str, criteria: &'static str) -> TerminologyResult<ConceptId> {
        self.find_concept(code)
            .ok_or_else(|| TerminologyError::UnknownConcept {
                criteria,
                system: self.system.clone(),
                code: code.to_string(),
            })
    }

    /// Gets a concept by id.
    pub fn concept(&self, id: ConceptId) -> &Concept {
        &self.nodes[id.index()].concept
    }

    /// Gets a concept by code.
    pub fn get(&self, code: &str) -> Option<&Concept> {
        self.find_concept(code).map(|id| self.concept(id))
    }

    /// Returns true if the code exists.
    pub fn has_concept(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    /// Gets direct parents of the given kind.
    pub fn parents(&self, id: ConceptId, kind: RelationshipKind) -> Vec<ConceptId> {
        self.nodes[id.index()]
            .parents
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(p, _)| *p)
            .collect()
    }

    /// Gets direct children of the given kind, in link order.
    pub fn children(&self, id: ConceptId, kind: RelationshipKind) -> Vec<ConceptId> {
        self.nodes[id.index()]
            .children
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(c, _)| *c)
            .collect()
    }

    /// Concepts without any parent, in insertion order.
    pub fn roots(&self) -> Vec<ConceptId> {
        self.concept_ids()
            .filter(|id| self.nodes[id.index()].parents.is_empty())
            .collect()
    }

    /// Iterates over all concept ids in insertion order.
    pub fn concept_ids(&self) -> impl Iterator<Item = ConceptId> + '_ {
        (0..self.nodes.len()).map(|i| ConceptId(i as u32))
    }

    /// Iterates over all concepts in insertion order.
    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.nodes.iter().map(|n| &n.concept)
    }

    /// Lazily walks the descendants of `id` (excluding `id`) in pre-order.
    ///
    /// The iterator is finite under multiple inheritance and can be cloned
    /// to restart from the current position.
    pub fn descendants_of(&self, id: ConceptId, kind: RelationshipKind) -> Descendants<'_> {
        Descendants::new(self, id, kind)
    }

    /// `id` followed by its descendants.
    pub fn descendants_or_self(
        &self,
        id: ConceptId,
        kind: RelationshipKind,
    ) -> impl Iterator<Item = ConceptId> + '_ {
        std::iter::once(id).chain(self.descendants_of(id, kind))
    }

    /// Gets all ancestors of a concept by BFS.
    pub fn ancestors_of(&self, id: ConceptId, kind: RelationshipKind) -> Vec<ConceptId> {
        let mut seen = HashSet::new();
        let mut ancestors = Vec::new();
        let mut queue: VecDeque<ConceptId> = self.parents(id, kind).into();

        while let Some(current) = queue.pop_front() {
            if seen.insert(current) {
                ancestors.push(current);
                queue.extend(self.parents(current, kind));
            }
        }

        ancestors
    }

    /// Checks if `id` is a (strict) descendant of `ancestor`.
    ///
    /// Walks upwards from `id`, which is cheaper than expanding `ancestor`
    /// when validating a single code.
    pub fn is_descendant_of(
        &self,
        id: ConceptId,
        ancestor: ConceptId,
        kind: RelationshipKind,
    ) -> bool {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<ConceptId> = self.parents(id, kind).into();

        while let Some(current) = queue.pop_front() {
            if current == ancestor {
                return true;
            }
            if seen.insert(current) {
                queue.extend(self.parents(current, kind));
            }
        }

        false
    }

    /// Returns the number of concepts.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph holds no concepts.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of parent/child links.
    pub fn link_count(&self) -> usize {
        self.nodes.iter().map(|n| n.children.len()).sum()
    }
}

/// Lazy pre-order walk over descendants. See [`ConceptGraph::descendants_of`].
#[derive(Debug, Clone)]
pub struct Descendants<'a> {
    graph: &'a ConceptGraph,
    kind: RelationshipKind,
    stack: Vec<ConceptId>,
    visited: HashSet<ConceptId>,
}

impl<'a> Descendants<'a> {
    fn new(graph: &'a ConceptGraph, anchor: ConceptId, kind: RelationshipKind) -> Self {
        let mut walk = Self {
            graph,
            kind,
            stack: Vec::new(),
            visited: HashSet::from([anchor]),
        };
        walk.push_children(anchor);
        walk
    }

    // Marked visited on push so a shared child is queued once.
    fn push_children(&mut self, id: ConceptId) {
        for &(child, kind) in self.graph.nodes[id.index()].children.iter().rev() {
            if kind == self.kind && self.visited.insert(child) {
                self.stack.push(child);
            }
        }
    }
}

impl Iterator for Descendants<'_> {
    type Item = ConceptId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.push_children(id);
        Some(id)
    }
}

/// One version of a code system and its concept graph.
///
/// Immutable once registered: replacing a code system registers a new
/// `CodeSystemVersion` with a higher revision.
#[derive(Debug, Clone)]
pub struct CodeSystemVersion {
    url: String,
    version: Option<String>,
    name: Option<String>,
    content: CodeSystemContentMode,
    revision: u64,
    graph: ConceptGraph,
}

impl CodeSystemVersion {
    /// Creates an empty code system version.
    pub fn new(
        url: impl Into<String>,
        version: Option<String>,
        name: Option<String>,
        content: CodeSystemContentMode,
    ) -> Self {
        let url = url.into();
        Self {
            graph: ConceptGraph::new(url.clone()),
            url,
            version,
            name,
            content,
            revision: 0,
        }
    }

    /// Builds a version from a resource's nested `concept` elements.
    pub fn from_definition(definition: &CodeSystemDefinition) -> TerminologyResult<Self> {
        let mut cs = Self::new(
            definition.url.clone(),
            definition.version.clone(),
            definition.name.clone(),
            definition.content,
        );
        cs.graph = ConceptGraph::with_capacity(definition.url.clone(), definition.concept_count());

        fn add_tree(
            graph: &mut ConceptGraph,
            concepts: &[ConceptDefinition],
            parent: Option<&str>,
        ) -> TerminologyResult<()> {
            for concept in concepts {
                let parents: Vec<&str> = parent.into_iter().collect();
                graph.add_concept(concept.code.clone(), concept.display.clone(), &parents)?;
                add_tree(graph, &concept.concepts, Some(&concept.code))?;
            }
            Ok(())
        }

        add_tree(&mut cs.graph, &definition.concepts, None)?;
        Ok(cs)
    }

    /// Adds a concept under the given ISA parents.
    pub fn add_concept(
        &mut self,
        code: impl Into<String>,
        display: Option<&str>,
        parent_codes: &[&str],
    ) -> TerminologyResult<ConceptId> {
        self.graph
            .add_concept(code, display.map(str::to_string), parent_codes)
    }

    /// Canonical URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Business version.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Content mode.
    pub fn content(&self) -> CodeSystemContentMode {
        self.content
    }

    /// Registry revision; 0 until registered.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    /// The concept graph.
    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    /// Mutable access for builders, before registration.
    pub fn graph_mut(&mut self) -> &mut ConceptGraph {
        &mut self.graph
    }

    /// Builds the expansion entry for a concept of this version.
    pub fn expansion_entry(&self, id: ConceptId, display: Option<&str>) -> ExpansionContains {
        let concept = self.graph.concept(id);
        ExpansionContains {
            system: self.url.clone(),
            version: self.version.clone(),
            code: concept.code.clone(),
            display: display
                .map(str::to_string)
                .or_else(|| concept.display.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CS: &str = "http://example.com/my_code_system";

    /// ParentA
    ///   childAA
    ///     childAAA
    ///     childAAB
    ///   childAB
    /// ParentB
    fn external_cs() -> CodeSystemVersion {
        let mut cs = CodeSystemVersion::new(CS, None, None, CodeSystemContentMode::NotPresent);
        cs.add_concept("ParentA", Some("Parent A"), &[]).unwrap();
        cs.add_concept("childAA", Some("Child AA"), &["ParentA"]).unwrap();
        cs.add_concept("childAAA", Some("Child AAA"), &["childAA"]).unwrap();
        cs.add_concept("childAAB", Some("Child AAB"), &["childAA"]).unwrap();
        cs.add_concept("childAB", Some("Child AB"), &["ParentA"]).unwrap();
        cs.add_concept("ParentB", Some("Parent B"), &[]).unwrap();
        cs
    }

    fn codes<'a>(graph: &'a ConceptGraph, ids: impl Iterator<Item = ConceptId>) -> Vec<&'a str> {
        ids.map(|id| graph.concept(id).code.as_str()).collect()
    }

    #[test]
    fn test_descendants_pre_order() {
        let cs = external_cs();
        let graph = cs.graph();
        let parent_a = graph.find_concept("ParentA").unwrap();

        let found = codes(graph, graph.descendants_of(parent_a, RelationshipKind::IsA));
        assert_eq!(found, vec!["childAA", "childAAA", "childAAB", "childAB"]);
    }

    #[test]
    fn test_descendants_under_multiple_inheritance() {
        let mut graph = ConceptGraph::new(CS);
        graph.add_concept("root", None, &[]).unwrap();
        graph.add_concept("left", None, &["root"]).unwrap();
        graph.add_concept("right", None, &["root"]).unwrap();
        graph.add_concept("shared", None, &["left", "right"]).unwrap();
        graph.add_concept("leaf", None, &["shared"]).unwrap();

        let root = graph.find_concept("root").unwrap();
        let found = codes(&graph, graph.descendants_of(root, RelationshipKind::IsA));
        assert_eq!(found, vec!["left", "shared", "leaf", "right"]);
    }

    #[test]
    fn test_descendants_restartable() {
        let cs = external_cs();
        let graph = cs.graph();
        let child_aa = graph.find_concept("childAA").unwrap();

        let walk = graph.descendants_of(child_aa, RelationshipKind::IsA);
        let first: Vec<_> = walk.clone().collect();
        let second: Vec<_> = walk.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_descendants_ignore_other_relationship_kinds() {
        let mut graph = ConceptGraph::new(CS);
        let body = graph.add_concept("body", None, &[]).unwrap();
        let arm = graph.add_concept("arm", None, &[]).unwrap();
        graph.add_child_link(body, arm, RelationshipKind::PartOf);

        assert_eq!(graph.descendants_of(body, RelationshipKind::IsA).count(), 0);
        assert_eq!(graph.descendants_of(body, RelationshipKind::PartOf).count(), 1);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut graph = ConceptGraph::new(CS);
        graph.add_concept("a", None, &[]).unwrap();
        graph.add_concept("b", None, &["a"]).unwrap();
        graph.link_codes("b", "a", RelationshipKind::IsA).unwrap();

        let a = graph.find_concept("a").unwrap();
        assert_eq!(codes(&graph, graph.descendants_of(a, RelationshipKind::IsA)), vec!["b"]);
        assert!(graph.is_descendant_of(a, graph.find_concept("b").unwrap(), RelationshipKind::IsA));
    }

    #[test]
    fn test_is_descendant_of() {
        let cs = external_cs();
        let graph = cs.graph();
        let parent_a = graph.find_concept("ParentA").unwrap();
        let parent_b = graph.find_concept("ParentB").unwrap();
        let leaf = graph.find_concept("childAAB").unwrap();

        assert!(graph.is_descendant_of(leaf, parent_a, RelationshipKind::IsA));
        assert!(!graph.is_descendant_of(leaf, parent_b, RelationshipKind::IsA));
        assert!(!graph.is_descendant_of(parent_a, parent_a, RelationshipKind::IsA));
        assert_eq!(graph.ancestors_of(leaf, RelationshipKind::IsA).len(), 2);
    }

    #[test]
    fn test_duplicate_and_missing_parent() {
        let mut cs = external_cs();
        let err = cs.add_concept("ParentA", None, &[]).unwrap_err();
        assert!(matches!(err, TerminologyError::DuplicateConcept { .. }));

        let err = cs.add_concept("orphan", None, &["nope"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid parent criteria - code does not exist: {http://example.com/my_code_system}nope"
        );
        assert_eq!(cs.graph().len(), 6);
    }

    #[test]
    fn test_roots_and_counts() {
        let cs = external_cs();
        let graph = cs.graph();
        assert_eq!(codes(graph, graph.roots().into_iter()), vec!["ParentA", "ParentB"]);
        assert_eq!(graph.link_count(), 4);
        assert!(graph.has_concept("childAB"));
        assert_eq!(graph.get("childAB").unwrap().display.as_deref(), Some("Child AB"));
    }

    #[test]
    fn test_from_definition() {
        let definition = CodeSystemDefinition::new(CS)
            .with_concept(
                ConceptDefinition::new("A", "Code A")
                    .with_child(ConceptDefinition::new("AA", "Code AA")),
            )
            .with_concept(ConceptDefinition::new("B", "Code B"));

        let cs = CodeSystemVersion::from_definition(&definition).unwrap();
        let a = cs.graph().find_concept("A").unwrap();
        let aa = cs.graph().find_concept("AA").unwrap();
        assert_eq!(cs.graph().children(a, RelationshipKind::IsA), vec![aa]);

        let entry = cs.expansion_entry(aa, None);
        assert_eq!(entry.system, CS);
        assert_eq!(entry.display.as_deref(), Some("Code AA"));
    }
}
