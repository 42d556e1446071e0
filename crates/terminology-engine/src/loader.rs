//! Terminology file discovery and loading.
//!
//! A data directory holds FHIR JSON resources (`CodeSystem`, `ValueSet`)
//! and custom terminology directories. A custom terminology directory is
//! any directory containing `concepts.csv`; it may also hold
//! `hierarchy.csv` and a `codesystem.json` header naming the system.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use terminology_types::{CodeSystemContentMode, CodeSystemDefinition, RelationshipKind, ValueSetDefinition};
use tracing::{debug, info};

use crate::engine::TerminologyEngine;
use crate::parser::{ConceptRow, CsvParser, HierarchyRow};
use crate::store::CodeSystemVersion;
use crate::types::{
    CsvConfig, CustomSystemFiles, LoadStats, TerminologyError, TerminologyFiles, TerminologyResult,
};

/// Concept file of a custom terminology directory.
pub const CONCEPT_FILE: &str = "concepts.csv";
/// Hierarchy file of a custom terminology directory.
pub const HIERARCHY_FILE: &str = "hierarchy.csv";
/// Header file of a custom terminology directory.
pub const HEADER_FILE: &str = "codesystem.json";

/// A parsed JSON resource file.
#[derive(Debug, Clone)]
pub enum LoadedResource {
    /// A CodeSystem resource.
    CodeSystem(CodeSystemDefinition),
    /// A ValueSet resource.
    ValueSet(ValueSetDefinition),
    /// Any other resource type, which is skipped.
    Other(String),
}

/// Discovers terminology files under a data directory.
pub fn discover_terminology_files<P: AsRef<Path>>(path: P) -> TerminologyResult<TerminologyFiles> {
    let path = path.as_ref();

    if !path.is_dir() {
        return Err(TerminologyError::DirectoryNotFound {
            path: path.display().to_string(),
        });
    }

    let mut files = TerminologyFiles::new();
    let mut pending = vec![path.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let concept_file = dir.join(CONCEPT_FILE);
        if concept_file.is_file() {
            files.custom_systems.push(custom_system_files(&dir, concept_file));
            continue;
        }

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let entry_path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(entry_path);
            } else if entry_path.extension().is_some_and(|ext| ext == "json") {
                files.resource_files.push(entry_path);
            }
        }
    }

    files.resource_files.sort();
    files.custom_systems.sort_by(|a, b| a.directory.cmp(&b.directory));
    Ok(files)
}

fn custom_system_files(dir: &Path, concept_file: PathBuf) -> CustomSystemFiles {
    let existing = |name: &str| Some(dir.join(name)).filter(|p| p.is_file());
    CustomSystemFiles {
        directory: dir.to_path_buf(),
        header_file: existing(HEADER_FILE),
        concept_file,
        hierarchy_file: existing(HIERARCHY_FILE),
    }
}

/// Reads one JSON resource file.
pub fn read_resource<P: AsRef<Path>>(path: P) -> TerminologyResult<LoadedResource> {
    let text = fs::read_to_string(path.as_ref())?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let resource_type = value
        .get("resourceType")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(match resource_type.as_str() {
        "CodeSystem" => LoadedResource::CodeSystem(serde_json::from_value(value)?),
        "ValueSet" => LoadedResource::ValueSet(serde_json::from_value(value)?),
        _ => LoadedResource::Other(resource_type),
    })
}

/// Builds the code system of a custom terminology directory.
///
/// Concepts are added as roots in file order; `hierarchy.csv` rows then link
/// children under parents, which may give a concept several parents.
pub fn build_custom_system(
    files: &CustomSystemFiles,
    config: &CsvConfig,
) -> TerminologyResult<CodeSystemVersion> {
    let header = match &files.header_file {
        Some(path) => serde_json::from_str::<CodeSystemDefinition>(&fs::read_to_string(path)?)?,
        None => {
            let name = files
                .directory
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut header = CodeSystemDefinition::new(format!("urn:terminology:{name}"));
            header.name = Some(name);
            header
        }
    };

    let mut cs = CodeSystemVersion::new(
        header.url,
        header.version,
        header.name,
        CodeSystemContentMode::Complete,
    );

    CsvParser::<_, ConceptRow>::from_path(&files.concept_file, config.clone())?.parse_batched(
        |batch| {
            for row in batch {
                cs.add_concept(row.code, row.display.as_deref(), &[])?;
            }
            Ok(())
        },
    )?;

    if let Some(hierarchy) = &files.hierarchy_file {
        let graph = cs.graph_mut();
        for row in CsvParser::<_, HierarchyRow>::from_path(hierarchy, config.clone())? {
            let row = row?;
            graph.link_codes(&row.parent, &row.child, RelationshipKind::IsA)?;
        }
    }

    debug!(
        url = cs.url(),
        concepts = cs.graph().len(),
        links = cs.graph().link_count(),
        "Built custom code system"
    );
    Ok(cs)
}

#[cfg(feature = "parallel")]
fn read_resources(paths: &[PathBuf]) -> Vec<(PathBuf, TerminologyResult<LoadedResource>)> {
    paths
        .par_iter()
        .map(|path| (path.clone(), read_resource(path)))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn read_resources(paths: &[PathBuf]) -> Vec<(PathBuf, TerminologyResult<LoadedResource>)> {
    paths
        .iter()
        .map(|path| (path.clone(), read_resource(path)))
        .collect()
}

#[cfg(feature = "parallel")]
fn build_custom_systems(
    systems: &[CustomSystemFiles],
    config: &CsvConfig,
) -> TerminologyResult<Vec<CodeSystemVersion>> {
    systems
        .par_iter()
        .map(|files| build_custom_system(files, config))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn build_custom_systems(
    systems: &[CustomSystemFiles],
    config: &CsvConfig,
) -> TerminologyResult<Vec<CodeSystemVersion>> {
    systems
        .iter()
        .map(|files| build_custom_system(files, config))
        .collect()
}

/// Loads discovered files into the engine.
///
/// Code systems are stored before value sets so that value sets deferred
/// for pre-expansion can resolve them.
pub fn load_files(
    engine: &TerminologyEngine,
    files: &TerminologyFiles,
    config: &CsvConfig,
) -> TerminologyResult<LoadStats> {
    let start = Instant::now();
    let mut stats = LoadStats::default();
    let mut value_sets = Vec::new();

    for (path, resource) in read_resources(&files.resource_files) {
        match resource? {
            LoadedResource::CodeSystem(cs) => {
                stats.concepts += cs.concept_count();
                engine.store_code_system(cs)?;
                stats.code_systems += 1;
            }
            LoadedResource::ValueSet(vs) => value_sets.push(vs),
            LoadedResource::Other(resource_type) => {
                debug!(path = %path.display(), resource_type = %resource_type, "Skipping resource");
                stats.skipped_files += 1;
            }
        }
    }

    for cs in build_custom_systems(&files.custom_systems, config)? {
        stats.concepts += cs.graph().len();
        engine.register_code_system(cs);
        stats.code_systems += 1;
    }

    for vs in value_sets {
        engine.store_value_set(vs)?;
        stats.value_sets += 1;
    }

    stats.load_time_ms = start.elapsed().as_millis() as u64;
    info!(
        code_systems = stats.code_systems,
        value_sets = stats.value_sets,
        concepts = stats.concepts,
        skipped = stats.skipped_files,
        elapsed_ms = stats.load_time_ms,
        "Loaded terminology"
    );
    Ok(stats)
}

/// Discovers and loads a data directory.
pub fn load_directory<P: AsRef<Path>>(
    engine: &TerminologyEngine,
    path: P,
    config: &CsvConfig,
) -> TerminologyResult<LoadStats> {
    let files = discover_terminology_files(path)?;
    load_files(engine, &files, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EngineConfig;
    use crate::ExpansionParams;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn data_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "acme.json",
            r#"{"resourceType": "CodeSystem", "id": "acme", "url": "http://acme.org", "content": "complete",
                "concept": [{"code": "8450-9", "display": "Systolic blood pressure--expiration"},
                            {"code": "11378-7", "display": "Systolic blood pressure at First encounter"}]}"#,
        );
        write(
            dir.path(),
            "vs.json",
            r#"{"resourceType": "ValueSet", "id": "acme-vs", "url": "http://acme.org/vs",
                "compose": {"include": [{"system": "http://acme.org"}]}}"#,
        );
        write(dir.path(), "patient.json", r#"{"resourceType": "Patient", "id": "p"}"#);

        let custom = dir.path().join("local");
        fs::create_dir(&custom).unwrap();
        write(&custom, HEADER_FILE, r#"{"url": "http://local.org/cs", "version": "1"}"#);
        write(&custom, CONCEPT_FILE, "CODE,DISPLAY\nA,Code A\nAA,Code AA\nB,Code B\n");
        write(&custom, HIERARCHY_FILE, "PARENT,CHILD\nA,AA\n");
        dir
    }

    #[test]
    fn test_discover() {
        let dir = data_dir();
        let files = discover_terminology_files(dir.path()).unwrap();
        assert_eq!(files.resource_files.len(), 3);
        assert_eq!(files.custom_systems.len(), 1);
        let custom = &files.custom_systems[0];
        assert!(custom.header_file.is_some());
        assert!(custom.hierarchy_file.is_some());
    }

    #[test]
    fn test_discover_missing_directory() {
        let err = discover_terminology_files("/definitely/not/here").unwrap_err();
        assert!(matches!(err, TerminologyError::DirectoryNotFound { .. }));
    }

    #[test]
    fn test_build_custom_system() {
        let dir = data_dir();
        let files = discover_terminology_files(dir.path()).unwrap();
        let cs = build_custom_system(&files.custom_systems[0], &CsvConfig::default()).unwrap();
        assert_eq!(cs.url(), "http://local.org/cs");
        assert_eq!(cs.version(), Some("1"));
        assert_eq!(cs.graph().len(), 3);
        let a = cs.graph().find_concept("A").unwrap();
        assert_eq!(cs.graph().descendants_of(a, RelationshipKind::IsA).count(), 1);
    }

    #[test]
    fn test_custom_system_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("colors");
        fs::create_dir(&custom).unwrap();
        write(&custom, CONCEPT_FILE, "CODE,DISPLAY\nred,Red\n");

        let files = discover_terminology_files(dir.path()).unwrap();
        let cs = build_custom_system(&files.custom_systems[0], &CsvConfig::default()).unwrap();
        assert_eq!(cs.url(), "urn:terminology:colors");
        assert_eq!(cs.name(), Some("colors"));
    }

    #[test]
    fn test_bad_hierarchy_row() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), CONCEPT_FILE, "CODE,DISPLAY\nA,Code A\n");
        write(dir.path(), HIERARCHY_FILE, "PARENT,CHILD\nA,missing\n");

        let files = discover_terminology_files(dir.path()).unwrap();
        let err = build_custom_system(&files.custom_systems[0], &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, TerminologyError::UnknownConcept { criteria: "child", .. }));
    }

    #[test]
    fn test_load_directory() {
        let dir = data_dir();
        let engine = TerminologyEngine::in_memory(EngineConfig::default()).unwrap();
        let stats = load_directory(&engine, dir.path(), &CsvConfig::default()).unwrap();

        assert_eq!(stats.code_systems, 2);
        assert_eq!(stats.value_sets, 1);
        assert_eq!(stats.concepts, 5);
        assert_eq!(stats.skipped_files, 1);

        let expansion = engine.expand_by_id("acme-vs", &ExpansionParams::new()).unwrap();
        assert_eq!(expansion.total, 2);
        assert!(engine.registry().contains("http://local.org/cs"));
    }
}
