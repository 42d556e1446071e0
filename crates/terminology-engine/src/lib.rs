//! # terminology-engine
//!
//! ValueSet expansion, pre-expansion and code validation over hierarchical
//! code systems.
//!
//! This crate provides:
//! - An arena-backed concept graph store with DAG-safe traversal
//! - A code system registry with inline, local and built-in resolution
//! - Live `$expand` of value set compose rules with filters, imports,
//!   excludes, text filtering and paging
//! - Background pre-expansion into snapshots with freshness checks
//! - `$validate-code` against stored, inline or implicit value sets
//! - Loading of FHIR JSON resources and custom CSV terminologies
//!
//! ## Features
//!
//! - `parallel` (default): Parses resource files and custom terminologies
//!   in parallel using rayon.
//!
//! ## Example
//!
//! ```rust
//! use terminology_engine::{EngineConfig, ExpansionParams, TerminologyEngine};
//! use terminology_engine::terminology_types::{ConceptSet, Filter, ValueSetDefinition};
//!
//! let engine = TerminologyEngine::in_memory(EngineConfig::default())?;
//! engine.register_external("http://example.com/cs", None, None, |graph| {
//!     graph.add_concept("ParentA", None, &[])?;
//!     graph.add_concept("childAA", None, &["ParentA"])?;
//!     Ok(())
//! })?;
//!
//! let vs = ValueSetDefinition::new("http://example.com/vs")
//!     .with_include(ConceptSet::system("http://example.com/cs").with_filter(Filter::is_a("ParentA")));
//! let expansion = engine.expand(&vs, &ExpansionParams::new())?;
//! assert_eq!(expansion.total, 2);
//! # Ok::<(), terminology_engine::TerminologyError>(())
//! ```

#![warn(missing_docs)]

mod builtin;
pub mod engine;
pub mod expansion;
pub mod loader;
pub mod materializer;
pub mod operations;
pub mod parser;
pub mod registry;
pub mod resource;
pub mod store;
pub mod types;

pub use engine::TerminologyEngine;
pub use expansion::{Expander, ExpansionParams, Window};
pub use loader::{
    build_custom_system, discover_terminology_files, load_directory, load_files, read_resource,
    LoadedResource,
};
pub use materializer::{
    content_hash, InMemorySnapshotStore, Materializer, PreExpansionReport, PreExpansionSnapshot,
    SnapshotStore,
};
pub use operations::{
    ExpandRequest, OperationError, OperationResult, ValidateCodeRequest,
};
pub use parser::{ConceptRow, CsvParser, CsvRecord, HierarchyRow};
pub use registry::CodeSystemRegistry;
pub use resource::{InMemoryResourceStore, ResourceStore};
pub use store::{CodeSystemVersion, ConceptGraph, ConceptId, Descendants};
pub use types::{
    CsvConfig, CustomSystemFiles, EngineConfig, LoadStats, TerminologyError, TerminologyFiles,
    TerminologyResult,
};

// Re-export terminology-types for convenience
pub use terminology_types;
