//! Pre-expansion materialization.
//!
//! Value sets marked for pre-expansion wait in a bounded queue until a batch
//! run expands them in full and publishes a [`PreExpansionSnapshot`]. A
//! snapshot is published by replacing the previous one in the
//! [`SnapshotStore`], so readers see either the old or the new expansion.
//!
//! Snapshots carry the content hash of the value set they were built from,
//! the content hash of every value set it imported and the revision of every
//! code system consulted. They are only served while all of these still
//! match.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use terminology_types::{ExpansionResult, ValueSetDefinition};
use tracing::{debug, info, warn};

use crate::registry::CodeSystemRegistry;
use crate::types::{TerminologyError, TerminologyResult};

/// Hash of a value set definition, used to detect compose changes.
pub fn content_hash(value_set: &ValueSetDefinition) -> u64 {
    let mut hasher = DefaultHasher::new();
    value_set.hash(&mut hasher);
    hasher.finish()
}

/// A materialized, unwindowed expansion of one value set.
#[derive(Debug, Clone)]
pub struct PreExpansionSnapshot {
    /// Resource id of the value set.
    pub value_set_id: String,
    /// [`content_hash`] of the definition that was expanded.
    pub content_hash: u64,
    /// Revision of each registered code system the expansion consulted.
    pub code_system_revisions: BTreeMap<String, u64>,
    /// [`content_hash`] of each imported value set, keyed by the reference
    /// the import used.
    pub value_set_hashes: BTreeMap<String, u64>,
    /// The full expansion.
    pub expansion: ExpansionResult,
}

impl PreExpansionSnapshot {
    /// Returns true if the snapshot still reflects `value_set`, the value
    /// sets it imported and the currently registered code systems.
    ///
    /// `current_hash` yields the [`content_hash`] of the value set an import
    /// reference resolves to now, or `None` if it no longer resolves.
    pub fn is_fresh<F>(
        &self,
        value_set: &ValueSetDefinition,
        registry: &CodeSystemRegistry,
        current_hash: F,
    ) -> bool
    where
        F: Fn(&str) -> Option<u64>,
    {
        self.content_hash == content_hash(value_set)
            && self
                .code_system_revisions
                .iter()
                .all(|(url, revision)| registry.current_revision(url) == Some(*revision))
            && self
                .value_set_hashes
                .iter()
                .all(|(reference, hash)| current_hash(reference) == Some(*hash))
    }

    /// Returns true if the expansion consulted the code system at `url`.
    pub fn depends_on(&self, url: &str) -> bool {
        self.code_system_revisions.contains_key(url)
    }

    /// Returns true if the expansion imported the value set referenced as
    /// `reference`.
    pub fn imports(&self, reference: &str) -> bool {
        self.value_set_hashes.contains_key(reference)
    }
}

/// Storage for pre-expansion snapshots with atomic read/replace semantics.
pub trait SnapshotStore: Send + Sync {
    /// Gets the snapshot of a value set.
    fn get(&self, value_set_id: &str) -> Option<Arc<PreExpansionSnapshot>>;

    /// Publishes a snapshot, replacing any previous one for the same id.
    fn replace(&self, snapshot: PreExpansionSnapshot) -> Arc<PreExpansionSnapshot>;

    /// Removes the snapshot of a value set.
    fn remove(&self, value_set_id: &str) -> bool;

    /// Ids of all stored snapshots.
    fn ids(&self) -> Vec<String>;
}

/// A [`SnapshotStore`] held in memory.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<String, Arc<PreExpansionSnapshot>>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn get(&self, value_set_id: &str) -> Option<Arc<PreExpansionSnapshot>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(value_set_id)
            .cloned()
    }

    fn replace(&self, snapshot: PreExpansionSnapshot) -> Arc<PreExpansionSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.value_set_id.clone(), Arc::clone(&snapshot));
        snapshot
    }

    fn remove(&self, value_set_id: &str) -> bool {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(value_set_id)
            .is_some()
    }

    fn ids(&self) -> Vec<String> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreExpansionReport {
    /// Snapshots published.
    pub processed: usize,
    /// Value sets whose expansion failed.
    pub failed: usize,
    /// Value sets skipped because another run was materializing them.
    pub skipped: usize,
    /// Value sets still queued when the run stopped.
    pub remaining: usize,
}

impl PreExpansionReport {
    /// Returns true if the run did nothing.
    pub fn is_empty(&self) -> bool {
        self.processed == 0 && self.failed == 0 && self.skipped == 0
    }
}

#[derive(Debug, Default)]
struct Deferred {
    queue: VecDeque<String>,
    pending: HashSet<String>,
}

/// Marks a value set id as in flight until dropped.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    value_set_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.value_set_id);
    }
}

/// Deferred queue, single-flight bookkeeping and snapshot publication.
pub struct Materializer {
    capacity: usize,
    deferred: Mutex<Deferred>,
    in_flight: Mutex<HashSet<String>>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("capacity", &self.capacity)
            .field("queued", &self.queued())
            .finish()
    }
}

impl Materializer {
    /// Creates a materializer with a queue of at most `capacity` ids.
    pub fn new(capacity: usize, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            capacity,
            deferred: Mutex::new(Deferred::default()),
            in_flight: Mutex::new(HashSet::new()),
            snapshots,
        }
    }

    /// The snapshot store.
    pub fn snapshots(&self) -> &Arc<dyn SnapshotStore> {
        &self.snapshots
    }

    /// Marks a value set as deferred. Returns false if it already was.
    pub fn schedule(&self, value_set_id: &str) -> TerminologyResult<bool> {
        let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
        if deferred.pending.contains(value_set_id) {
            return Ok(false);
        }
        if deferred.queue.len() >= self.capacity {
            warn!(value_set_id, capacity = self.capacity, "Pre-expansion queue is full");
            return Err(TerminologyError::QueueFull {
                capacity: self.capacity,
            });
        }
        deferred.pending.insert(value_set_id.to_string());
        deferred.queue.push_back(value_set_id.to_string());
        debug!(value_set_id, "Deferred value set for pre-expansion");
        Ok(true)
    }

    /// Returns true if the value set is waiting in the queue.
    pub fn is_deferred(&self, value_set_id: &str) -> bool {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .contains(value_set_id)
    }

    /// Number of queued value sets.
    pub fn queued(&self) -> usize {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .len()
    }

    fn pop(&self) -> Option<String> {
        let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
        let id = deferred.queue.pop_front()?;
        deferred.pending.remove(&id);
        Some(id)
    }

    /// Claims `value_set_id` for materialization. Returns `None` if another
    /// caller holds it.
    pub fn try_begin(&self, value_set_id: &str) -> Option<InFlightGuard<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(value_set_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: &self.in_flight,
            value_set_id: value_set_id.to_string(),
        })
    }

    /// Materializes one value set under the single-flight guard. Returns
    /// `Ok(None)` if it was already in flight.
    pub fn materialize<F>(
        &self,
        value_set_id: &str,
        build: F,
    ) -> TerminologyResult<Option<Arc<PreExpansionSnapshot>>>
    where
        F: FnOnce(&str) -> TerminologyResult<PreExpansionSnapshot>,
    {
        let Some(_guard) = self.try_begin(value_set_id) else {
            debug!(value_set_id, "Pre-expansion already in flight");
            return Ok(None);
        };
        let snapshot = build(value_set_id)?;
        Ok(Some(self.snapshots.replace(snapshot)))
    }

    /// Drains the queue, materializing each value set with `build`.
    ///
    /// Stops between items once `shutdown` is set; unprocessed ids stay
    /// queued. A failing item is logged and counted without stopping the run.
    pub fn run_until<F>(&self, shutdown: &AtomicBool, mut build: F) -> PreExpansionReport
    where
        F: FnMut(&str) -> TerminologyResult<PreExpansionSnapshot>,
    {
        let start = Instant::now();
        let mut report = PreExpansionReport::default();

        while !shutdown.load(Ordering::Acquire) {
            let Some(id) = self.pop() else {
                break;
            };
            match self.materialize(&id, &mut build) {
                Ok(Some(snapshot)) => {
                    info!(
                        value_set_id = %id,
                        codes = snapshot.expansion.total,
                        "Pre-expanded value set"
                    );
                    report.processed += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(value_set_id = %id, error = %e, "Pre-expansion failed");
                    report.failed += 1;
                }
            }
        }

        report.remaining = self.queued();
        if !report.is_empty() {
            info!(
                processed = report.processed,
                failed = report.failed,
                skipped = report.skipped,
                remaining = report.remaining,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Pre-expansion batch finished"
            );
        }
        report
    }

    /// Drops the snapshot of a value set.
    pub fn invalidate(&self, value_set_id: &str) -> bool {
        self.snapshots.remove(value_set_id)
    }

    /// Drops every snapshot built from the code system at `url` and returns
    /// the affected value set ids.
    pub fn invalidate_for_system(&self, url: &str) -> Vec<String> {
        self.invalidate_where(|snapshot| snapshot.depends_on(url))
    }

    /// Drops every snapshot that imported a value set under any of
    /// `references` and returns the affected value set ids.
    pub fn invalidate_importers(&self, references: &[&str]) -> Vec<String> {
        self.invalidate_where(|snapshot| references.iter().any(|r| snapshot.imports(r)))
    }

    fn invalidate_where<P>(&self, stale: P) -> Vec<String>
    where
        P: Fn(&PreExpansionSnapshot) -> bool,
    {
        let mut invalidated: Vec<String> = self
            .snapshots
            .ids()
            .into_iter()
            .filter(|id| self.snapshots.get(id).is_some_and(|snapshot| stale(snapshot.as_ref())))
            .collect();
        invalidated.retain(|id| self.snapshots.remove(id));
        invalidated.sort();
        invalidated
    }
}
