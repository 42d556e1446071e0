//! The terminology engine.
//!
//! [`TerminologyEngine`] ties the registry, the resource store and the
//! materializer together and exposes `$expand` and `$validate-code`
//! semantics over loaded value sets.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use terminology_types::{
    CodeSystemDefinition, ExpansionContains, ExpansionResult, ValidationResult, ValueSetDefinition,
};
use tracing::{debug, warn};

use crate::expansion::{Expander, ExpansionParams};
use crate::materializer::{
    content_hash, InMemorySnapshotStore, Materializer, PreExpansionReport, PreExpansionSnapshot,
    SnapshotStore,
};
use crate::registry::CodeSystemRegistry;
use crate::resource::{InMemoryResourceStore, ResourceStore};
use crate::store::{CodeSystemVersion, ConceptGraph};
use crate::types::{EngineConfig, TerminologyError, TerminologyResult};

/// Expansion and validation over registered code systems.
pub struct TerminologyEngine {
    config: EngineConfig,
    registry: CodeSystemRegistry,
    resources: Arc<dyn ResourceStore>,
    materializer: Materializer,
}

impl std::fmt::Debug for TerminologyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminologyEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("materializer", &self.materializer)
            .finish()
    }
}

impl TerminologyEngine {
    /// Creates an engine over the given stores.
    pub fn new(
        config: EngineConfig,
        resources: Arc<dyn ResourceStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> TerminologyResult<Self> {
        Ok(Self {
            materializer: Materializer::new(config.deferred_queue_capacity, snapshots),
            registry: CodeSystemRegistry::new()?,
            resources,
            config,
        })
    }

    /// Creates an engine with in-memory resource and snapshot stores.
    pub fn in_memory(config: EngineConfig) -> TerminologyResult<Self> {
        Self::new(
            config,
            Arc::new(InMemoryResourceStore::new()),
            Arc::new(InMemorySnapshotStore::new()),
        )
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Code system registry.
    pub fn registry(&self) -> &CodeSystemRegistry {
        &self.registry
    }

    /// Resource store.
    pub fn resources(&self) -> &Arc<dyn ResourceStore> {
        &self.resources
    }

    /// Pre-expansion materializer.
    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    // ═══════════════════════════════════════════════════════════════════════
    // WRITES
    // ═══════════════════════════════════════════════════════════════════════

    /// Stores a CodeSystem resource.
    ///
    /// Resources carrying their concepts are registered immediately. When
    /// the resource's URL changed, the old URL stops resolving. Returns the
    /// resource id.
    pub fn store_code_system(&self, definition: CodeSystemDefinition) -> TerminologyResult<String> {
        let id = definition
            .id
            .clone()
            .unwrap_or_else(|| definition.url.clone());
        let url = definition.url.clone();

        let moved_from = if definition.content.carries_concepts() {
            let cs = CodeSystemVersion::from_definition(&definition)?;
            self.resources.save_code_system(&id, definition)?;
            self.registry.register_resource(&id, cs).1
        } else {
            self.resources.save_code_system(&id, definition)?;
            self.registry.bind_resource(&id, &url)
        };

        if let Some(old_url) = moved_from {
            self.code_system_changed(&old_url);
        }
        self.code_system_changed(&url);
        Ok(id)
    }

    /// Registers a code system version built by the caller.
    pub fn register_code_system(&self, cs: CodeSystemVersion) -> Arc<CodeSystemVersion> {
        let url = cs.url().to_string();
        let registered = self.registry.register(cs);
        self.code_system_changed(&url);
        registered
    }

    /// Registers a `not-present` code system populated by `builder`.
    pub fn register_external<F>(
        &self,
        url: &str,
        version: Option<&str>,
        name: Option<&str>,
        builder: F,
    ) -> TerminologyResult<Arc<CodeSystemVersion>>
    where
        F: FnOnce(&mut ConceptGraph) -> TerminologyResult<()>,
    {
        let registered = self.registry.register_external(url, version, name, builder)?;
        self.code_system_changed(url);
        Ok(registered)
    }

    /// Stores a ValueSet resource and returns its id.
    pub fn store_value_set(&self, value_set: ValueSetDefinition) -> TerminologyResult<String> {
        let id = self.resources.save_value_set(value_set)?;
        self.value_set_changed(&id)?;
        Ok(id)
    }

    /// Drops the snapshot of a changed value set and of every value set
    /// that imported it. With pre-expansion enabled, all of them are
    /// deferred for re-materialization.
    pub fn value_set_changed(&self, value_set_id: &str) -> TerminologyResult<()> {
        self.materializer.invalidate(value_set_id);

        let url = self
            .resources
            .load_value_set(value_set_id)
            .and_then(|value_set| value_set.url);
        let mut references = vec![value_set_id];
        references.extend(url.as_deref());
        let importers = self.materializer.invalidate_importers(&references);
        if !importers.is_empty() {
            debug!(value_set_id, value_sets = importers.len(), "Invalidated importing pre-expansions");
        }

        if self.config.pre_expand_value_sets {
            self.materializer.schedule(value_set_id)?;
            self.redefer(importers);
        }
        Ok(())
    }

    /// Drops every snapshot that consulted the code system at `url`.
    pub fn code_system_changed(&self, url: &str) {
        let invalidated = self.materializer.invalidate_for_system(url);
        if invalidated.is_empty() {
            return;
        }
        debug!(url, value_sets = invalidated.len(), "Invalidated pre-expansions");
        if self.config.pre_expand_value_sets {
            self.redefer(invalidated);
        }
    }

    fn redefer(&self, value_set_ids: Vec<String>) {
        for id in value_set_ids {
            if let Err(e) = self.materializer.schedule(&id) {
                warn!(value_set_id = %id, error = %e, "Could not re-defer value set");
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PRE-EXPANSION
    // ═══════════════════════════════════════════════════════════════════════

    /// Marks a value set for background pre-expansion.
    pub fn schedule_pre_expansion(&self, value_set_id: &str) -> TerminologyResult<bool> {
        self.materializer.schedule(value_set_id)
    }

    /// Materializes every deferred value set.
    pub fn run_deferred_pre_expansions(&self) -> PreExpansionReport {
        self.run_deferred_pre_expansions_until(&AtomicBool::new(false))
    }

    /// Materializes deferred value sets until the queue is empty or
    /// `shutdown` is set.
    pub fn run_deferred_pre_expansions_until(&self, shutdown: &AtomicBool) -> PreExpansionReport {
        self.materializer
            .run_until(shutdown, |id| self.build_snapshot(id))
    }

    /// Materializes one value set now. Returns `None` if it was already in
    /// flight elsewhere.
    pub fn pre_expand(&self, value_set_id: &str) -> TerminologyResult<Option<Arc<PreExpansionSnapshot>>> {
        self.materializer
            .materialize(value_set_id, |id| self.build_snapshot(id))
    }

    fn build_snapshot(&self, value_set_id: &str) -> TerminologyResult<PreExpansionSnapshot> {
        let value_set = self.load_value_set(value_set_id)?;
        let mut expander = Expander::new(&self.registry, self.resources.as_ref());
        let contains = expander.expand(&value_set)?;
        let total = contains.len();
        let (code_system_revisions, value_set_hashes) = expander.into_dependencies();

        Ok(PreExpansionSnapshot {
            value_set_id: value_set_id.to_string(),
            content_hash: content_hash(&value_set),
            code_system_revisions,
            value_set_hashes,
            expansion: ExpansionResult::new(contains, total, 0, None),
        })
    }

    /// Returns the snapshot of `value_set` if pre-expansion is enabled and
    /// the snapshot is fresh.
    pub fn fresh_snapshot(&self, value_set: &ValueSetDefinition) -> Option<Arc<PreExpansionSnapshot>> {
        if !self.config.pre_expand_value_sets {
            return None;
        }
        let id = value_set.identity()?;
        let snapshot = self.materializer.snapshots().get(id)?;
        let current_hash = |reference: &str| {
            self.load_value_set(reference)
                .ok()
                .map(|imported| content_hash(&imported))
        };
        if snapshot.is_fresh(value_set, &self.registry, current_hash) {
            return Some(snapshot);
        }
        debug!(value_set_id = id, "Pre-expansion is stale");
        if let Err(e) = self.materializer.schedule(id) {
            warn!(value_set_id = id, error = %e, "Could not re-defer value set");
        }
        None
    }

    // ═══════════════════════════════════════════════════════════════════════
    // EXPAND / VALIDATE
    // ═══════════════════════════════════════════════════════════════════════

    /// Loads a value set by id or URL from the resource store or the
    /// built-ins.
    pub fn load_value_set(&self, id_or_url: &str) -> TerminologyResult<ValueSetDefinition> {
        self.resources
            .load_value_set(id_or_url)
            .or_else(|| self.registry.built_in_value_set(id_or_url).cloned())
            .ok_or_else(|| TerminologyError::unknown_value_set(id_or_url))
    }

    /// Expands a value set.
    ///
    /// Offset and count are validated before any graph work. A fresh
    /// snapshot is served when pre-expansion is enabled; otherwise the
    /// compose rules are walked live.
    pub fn expand(
        &self,
        value_set: &ValueSetDefinition,
        params: &ExpansionParams,
    ) -> TerminologyResult<ExpansionResult> {
        params.window()?;

        if let Some(snapshot) = self.fresh_snapshot(value_set) {
            debug!(value_set = value_set.label(), "Expanding from pre-expansion");
            return params.apply(snapshot.expansion.contains.clone());
        }

        let contains = Expander::new(&self.registry, self.resources.as_ref())
            .with_limit(self.config.max_expansion_size)
            .expand(value_set)?;
        params.apply(contains)
    }

    /// Expands a stored value set by id or URL.
    pub fn expand_by_id(&self, id_or_url: &str, params: &ExpansionParams) -> TerminologyResult<ExpansionResult> {
        params.window()?;
        let value_set = self.load_value_set(id_or_url)?;
        self.expand(&value_set, params)
    }

    /// Validates `code` against a value set.
    ///
    /// With no `system`, any system the value set draws from may match. A
    /// supplied `display` must equal the concept's display.
    pub fn validate_code(
        &self,
        value_set: &ValueSetDefinition,
        system: Option<&str>,
        code: &str,
        display: Option<&str>,
    ) -> TerminologyResult<ValidationResult> {
        let member = match self.fresh_snapshot(value_set) {
            Some(snapshot) => snapshot.expansion.find(system, code).cloned(),
            None => Expander::new(&self.registry, self.resources.as_ref())
                .find_member(value_set, system, code)?,
        };

        Ok(judge(value_set, system, code, display, member))
    }

    /// Validates `code` against a stored value set by id or URL.
    pub fn validate_code_by_id(
        &self,
        id_or_url: &str,
        system: Option<&str>,
        code: &str,
        display: Option<&str>,
    ) -> TerminologyResult<ValidationResult> {
        let value_set = self.load_value_set(id_or_url)?;
        self.validate_code(&value_set, system, code, display)
    }

    /// Validates `code` against all codes of `system`.
    pub fn validate_code_in_system(
        &self,
        system: &str,
        code: &str,
        display: Option<&str>,
    ) -> TerminologyResult<ValidationResult> {
        if !self.registry.contains(system) && self.resources.load_code_system(system).is_none() {
            return Err(TerminologyError::unknown_code_system(system, None));
        }
        let implicit = ValueSetDefinition::all_codes_of(system);
        self.validate_code(&implicit, Some(system), code, display)
    }
}

fn judge(
    value_set: &ValueSetDefinition,
    system: Option<&str>,
    code: &str,
    display: Option<&str>,
    member: Option<ExpansionContains>,
) -> ValidationResult {
    let Some(member) = member else {
        let coding = match system {
            Some(system) => format!("{system}#{code}"),
            None => code.to_string(),
        };
        return ValidationResult::failure(format!(
            "Unknown code '{coding}' for ValueSet {}",
            value_set.label()
        ));
    };

    match (display, member.display.as_deref()) {
        (Some(given), Some(expected)) if given != expected => ValidationResult::failure(format!(
            "Concept Display \"{given}\" does not match expected \"{expected}\" for {}#{code}",
            member.system
        )),
        _ => ValidationResult::success(member.display),
    }
}
