//! Code system registry.
//!
//! Maps canonical URLs to immutable [`CodeSystemVersion`]s. Each URL keeps
//! its current version plus every registered business version, selected by
//! a compose rule's `version`. Every registration is stamped with a
//! registry-wide revision number, and publication is a single `Arc` swap under a write
//! lock, so readers always see a complete code system.
//!
//! Resolution order is: inline code systems of the current request, then
//! locally registered code systems, then the built-in systems.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use terminology_types::{CodeSystemContentMode, ValueSetDefinition};
use tracing::{debug, info};

use crate::builtin;
use crate::store::{CodeSystemVersion, ConceptGraph};
use crate::types::{TerminologyError, TerminologyResult};

#[derive(Debug)]
struct RegistryEntry {
    /// Most recently registered version.
    current: Arc<CodeSystemVersion>,
    /// Registered versions by business version label.
    by_version: HashMap<String, Arc<CodeSystemVersion>>,
}

/// Registry of code system versions.
#[derive(Debug)]
pub struct CodeSystemRegistry {
    systems: RwLock<HashMap<String, RegistryEntry>>,
    /// CodeSystem resource id -> URL it is registered under.
    resource_urls: RwLock<HashMap<String, String>>,
    built_in_systems: HashMap<String, Arc<CodeSystemVersion>>,
    built_in_value_sets: Vec<ValueSetDefinition>,
    next_revision: AtomicU64,
}

impl CodeSystemRegistry {
    /// Creates a registry holding only the built-in code systems.
    pub fn new() -> TerminologyResult<Self> {
        let next_revision = AtomicU64::new(1);
        let built_in_systems = builtin::built_in_code_systems()?
            .into_iter()
            .map(|mut cs| {
                cs.set_revision(next_revision.fetch_add(1, Ordering::SeqCst));
                (cs.url().to_string(), Arc::new(cs))
            })
            .collect();

        Ok(Self {
            systems: RwLock::new(HashMap::new()),
            resource_urls: RwLock::new(HashMap::new()),
            built_in_systems,
            built_in_value_sets: builtin::built_in_value_sets(),
            next_revision,
        })
    }

    /// Registers a code system version, replacing any current version under
    /// the same URL. Returns the published version.
    pub fn register(&self, mut cs: CodeSystemVersion) -> Arc<CodeSystemVersion> {
        let revision = self.next_revision.fetch_add(1, Ordering::SeqCst);
        cs.set_revision(revision);
        let cs = Arc::new(cs);

        let mut systems = self.systems.write().unwrap_or_else(PoisonError::into_inner);
        let entry = systems
            .entry(cs.url().to_string())
            .or_insert_with(|| RegistryEntry {
                current: Arc::clone(&cs),
                by_version: HashMap::new(),
            });
        entry.current = Arc::clone(&cs);
        if let Some(version) = cs.version() {
            entry.by_version.insert(version.to_string(), Arc::clone(&cs));
        }

        info!(
            url = cs.url(),
            version = cs.version().unwrap_or("-"),
            revision,
            concepts = cs.graph().len(),
            "Registered code system"
        );
        cs
    }

    /// Registers a `not-present` code system whose concepts are supplied by
    /// the caller rather than carried in a resource.
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
        let mut cs = CodeSystemVersion::new(
            url,
            version.map(str::to_string),
            name.map(str::to_string),
            CodeSystemContentMode::NotPresent,
        );
        builder(cs.graph_mut())?;
        Ok(self.register(cs))
    }

    /// Registers a code system owned by a stored CodeSystem resource.
    ///
    /// Returns the published version and, when the resource previously lived
    /// under another URL, that URL (which is no longer registered).
    pub fn register_resource(
        &self,
        resource_id: &str,
        cs: CodeSystemVersion,
    ) -> (Arc<CodeSystemVersion>, Option<String>) {
        let moved_from = self.bind_resource(resource_id, cs.url());
        (self.register(cs), moved_from)
    }

    /// Records that `resource_id` now defines `url`. If it defined another
    /// URL before, that registration is removed and the old URL returned.
    pub fn bind_resource(&self, resource_id: &str, url: &str) -> Option<String> {
        let previous = self
            .resource_urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource_id.to_string(), url.to_string());

        match previous {
            Some(old_url) if old_url != url => {
                debug!(resource_id, old_url = %old_url, new_url = url, "Code system resource changed URL");
                self.remove(&old_url);
                Some(old_url)
            }
            _ => None,
        }
    }

    /// Removes every version registered under `url`.
    pub fn remove(&self, url: &str) -> bool {
        self.systems
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url)
            .is_some()
    }

    /// Finds a locally registered code system.
    pub fn find_local(&self, url: &str, version: Option<&str>) -> Option<Arc<CodeSystemVersion>> {
        let systems = self.systems.read().unwrap_or_else(PoisonError::into_inner);
        let entry = systems.get(url)?;
        match version {
            Some(version) => entry.by_version.get(version).cloned(),
            None => Some(Arc::clone(&entry.current)),
        }
    }

    /// Finds a built-in code system.
    pub fn find_built_in(&self, url: &str, version: Option<&str>) -> Option<Arc<CodeSystemVersion>> {
        self.built_in_systems
            .get(url)
            .filter(|cs| version.is_none() || cs.version() == version)
            .cloned()
    }

    /// Resolves a code system: local registrations first, then built-ins.
    pub fn resolve(&self, url: &str, version: Option<&str>) -> TerminologyResult<Arc<CodeSystemVersion>> {
        self.resolve_with(url, version, &[])
    }

    /// Resolves a code system, consulting the request's inline code systems
    /// first.
    pub fn resolve_with(
        &self,
        url: &str,
        version: Option<&str>,
        inline: &[Arc<CodeSystemVersion>],
    ) -> TerminologyResult<Arc<CodeSystemVersion>> {
        inline
            .iter()
            .find(|cs| cs.url() == url && (version.is_none() || cs.version() == version))
            .cloned()
            .or_else(|| self.find_local(url, version))
            .or_else(|| self.find_built_in(url, version))
            .ok_or_else(|| TerminologyError::unknown_code_system(url, version))
    }

    /// Revision of the code system currently resolvable under `url`.
    pub fn current_revision(&self, url: &str) -> Option<u64> {
        self.find_local(url, None)
            .or_else(|| self.find_built_in(url, None))
            .map(|cs| cs.revision())
    }

    /// Returns true if `url` resolves locally or as a built-in.
    pub fn contains(&self, url: &str) -> bool {
        self.current_revision(url).is_some()
    }

    /// URLs of all locally registered code systems.
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .systems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        urls.sort();
        urls
    }

    /// Number of locally registered code systems.
    pub fn len(&self) -> usize {
        self.systems.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing has been registered locally.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a built-in value set by URL or id.
    pub fn built_in_value_set(&self, id_or_url: &str) -> Option<&ValueSetDefinition> {
        self.built_in_value_sets
            .iter()
            .find(|vs| vs.url.as_deref() == Some(id_or_url) || vs.id.as_deref() == Some(id_or_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terminology_types::well_known;

    fn cs(url: &str, version: Option<&str>, codes: &[&str]) -> CodeSystemVersion {
        let mut cs = CodeSystemVersion::new(
            url,
            version.map(str::to_string),
            None,
            CodeSystemContentMode::Complete,
        );
        for code in codes {
            cs.add_concept(*code, None, &[]).unwrap();
        }
        cs
    }

    #[test]
    fn test_built_ins_resolve() {
        let registry = CodeSystemRegistry::new().unwrap();
        let yes_no = registry.resolve(well_known::V2_0136, None).unwrap();
        assert_eq!(
            yes_no.graph().get("Y").and_then(|c| c.display.as_deref()),
            Some("Yes")
        );
        assert!(registry.is_empty());
        assert!(registry.built_in_value_set("yesnodontknow").is_some());
        assert!(registry.built_in_value_set(well_known::VS_MARITAL_STATUS).is_some());
    }

    #[test]
    fn test_register_bumps_revision() {
        let registry = CodeSystemRegistry::new().unwrap();
        let first = registry.register(cs("http://cs", None, &["A"]));
        let second = registry.register(cs("http://cs", None, &["A", "B"]));

        assert!(second.revision() > first.revision());
        assert_eq!(registry.current_revision("http://cs"), Some(second.revision()));
        assert_eq!(registry.resolve("http://cs", None).unwrap().graph().len(), 2);
        // The replaced version is untouched.
        assert_eq!(first.graph().len(), 1);
    }

    #[test]
    fn test_resolve_by_version() {
        let registry = CodeSystemRegistry::new().unwrap();
        registry.register(cs("http://cs", Some("1"), &["A"]));
        registry.register(cs("http://cs", Some("2"), &["A", "B"]));

        assert_eq!(registry.resolve("http://cs", Some("1")).unwrap().graph().len(), 1);
        assert_eq!(registry.resolve("http://cs", None).unwrap().version(), Some("2"));

        let err = registry.resolve("http://cs", Some("3")).unwrap_err();
        assert_eq!(err.to_string(), "Unknown CodeSystem: http://cs|3");

        // Versions come from the rule, never from the URL text.
        assert!(registry.resolve("http://cs|1", None).is_err());
        assert!(registry.find_local("http://cs|1", None).is_none());
    }

    #[test]
    fn test_inline_takes_priority() {
        let registry = CodeSystemRegistry::new().unwrap();
        registry.register(cs("http://cs", None, &["A"]));
        let inline = vec![Arc::new(cs("http://cs", None, &["X", "Y", "Z"]))];

        let resolved = registry.resolve_with("http://cs", None, &inline).unwrap();
        assert_eq!(resolved.graph().len(), 3);
    }

    #[test]
    fn test_local_shadows_built_in() {
        let registry = CodeSystemRegistry::new().unwrap();
        registry.register(cs(well_known::V2_0136, None, &["maybe"]));
        let resolved = registry.resolve(well_known::V2_0136, None).unwrap();
        assert!(resolved.graph().has_concept("maybe"));
        assert!(!resolved.graph().has_concept("Y"));
    }

    #[test]
    fn test_resource_url_change_unregisters_old_url() {
        let registry = CodeSystemRegistry::new().unwrap();
        let (_, moved) = registry.register_resource("CS", cs("http://foo1", None, &["A"]));
        assert!(moved.is_none());

        let (_, moved) = registry.register_resource("CS", cs("http://foo2", None, &["A"]));
        assert_eq!(moved.as_deref(), Some("http://foo1"));
        assert!(!registry.contains("http://foo1"));
        assert!(registry.contains("http://foo2"));
        assert_eq!(registry.urls(), vec!["http://foo2".to_string()]);
    }

    #[test]
    fn test_register_external() {
        let registry = CodeSystemRegistry::new().unwrap();
        let cs = registry
            .register_external("http://ext", Some("SYSTEM VERSION"), Some("SYSTEM NAME"), |graph| {
                graph.add_concept("ParentA", None, &[])?;
                graph.add_concept("childAA", None, &["ParentA"])?;
                Ok(())
            })
            .unwrap();

        assert_eq!(cs.content(), CodeSystemContentMode::NotPresent);
        assert_eq!(cs.name(), Some("SYSTEM NAME"));
        assert_eq!(cs.graph().len(), 2);

        let failed = registry.register_external("http://bad", None, None, |graph| {
            graph.add_concept("child", None, &["missing"]).map(|_| ())
        });
        assert!(failed.is_err());
        assert!(!registry.contains("http://bad"));
    }

    #[test]
    fn test_unknown_code_system() {
        let registry = CodeSystemRegistry::new().unwrap();
        let err = registry.resolve("http://nope", None).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
