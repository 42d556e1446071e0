//! Resource store boundary.
//!
//! ValueSet and CodeSystem resources are owned by an external store. The
//! engine only reads definitions transiently and reports writes back to it.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use terminology_types::{CodeSystemDefinition, ValueSetDefinition};

use crate::types::{TerminologyError, TerminologyResult};

/// Persistence collaborator for terminology resources.
pub trait ResourceStore: Send + Sync {
    /// Loads a value set by resource id or canonical URL.
    fn load_value_set(&self, id_or_url: &str) -> Option<ValueSetDefinition>;

    /// Loads a code system by resource id or canonical URL.
    fn load_code_system(&self, id_or_url: &str) -> Option<CodeSystemDefinition>;

    /// Stores a value set and returns its resource id.
    fn save_value_set(&self, value_set: ValueSetDefinition) -> TerminologyResult<String>;

    /// Stores a code system and returns the definition it replaced, if any.
    fn save_code_system(
        &self,
        id: &str,
        code_system: CodeSystemDefinition,
    ) -> TerminologyResult<Option<CodeSystemDefinition>>;

    /// Resource ids of all stored value sets.
    fn value_set_ids(&self) -> Vec<String>;
}

/// A [`ResourceStore`] backed by in-memory maps.
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    value_sets: RwLock<HashMap<String, ValueSetDefinition>>,
    code_systems: RwLock<HashMap<String, CodeSystemDefinition>>,
}

impl InMemoryResourceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a value set by id.
    pub fn remove_value_set(&self, id: &str) -> Option<ValueSetDefinition> {
        self.value_sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

fn find_by_id_or_url<'a, T>(
    map: &'a HashMap<String, T>,
    id_or_url: &str,
    url_of: impl Fn(&T) -> Option<&str>,
) -> Option<&'a T> {
    map.get(id_or_url)
        .or_else(|| map.values().find(|item| url_of(item) == Some(id_or_url)))
}

impl ResourceStore for InMemoryResourceStore {
    fn load_value_set(&self, id_or_url: &str) -> Option<ValueSetDefinition> {
        let value_sets = self.value_sets.read().unwrap_or_else(PoisonError::into_inner);
        find_by_id_or_url(&value_sets, id_or_url, |vs| vs.url.as_deref()).cloned()
    }

    fn load_code_system(&self, id_or_url: &str) -> Option<CodeSystemDefinition> {
        let code_systems = self.code_systems.read().unwrap_or_else(PoisonError::into_inner);
        find_by_id_or_url(&code_systems, id_or_url, |cs| Some(cs.url.as_str())).cloned()
    }

    fn save_value_set(&self, value_set: ValueSetDefinition) -> TerminologyResult<String> {
        let id = value_set
            .identity()
            .ok_or_else(|| {
                TerminologyError::invalid_parameter("ValueSet must have an id or a url to be stored")
            })?
            .to_string();
        self.value_sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), value_set);
        Ok(id)
    }

    fn save_code_system(
        &self,
        id: &str,
        code_system: CodeSystemDefinition,
    ) -> TerminologyResult<Option<CodeSystemDefinition>> {
        Ok(self
            .code_systems
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), code_system))
    }

    fn value_set_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .value_sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
