//! Engine error, result and configuration types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the terminology engine.
///
/// Messages are stable: callers and tests match on their exact wording.
#[derive(Error, Debug)]
pub enum TerminologyError {
    /// Malformed, conflicting or out-of-range request parameters.
    #[error("{0}")]
    InvalidParameter(String),

    /// A value set or code system reference does not resolve.
    #[error("Unknown {resource_type}: {reference}")]
    UnknownResource {
        /// Resource type that was looked up (`ValueSet`, `CodeSystem`).
        resource_type: &'static str,
        /// The id or URL that did not resolve.
        reference: String,
    },

    /// No code system is known under the given canonical.
    #[error("Unknown CodeSystem: {canonical}")]
    UnknownCodeSystem {
        /// URL, with `|version` appended when a version was requested.
        canonical: String,
    },

    /// A code named by a compose rule is not in its code system.
    #[error("Invalid {criteria} criteria - code does not exist: {{{system}}}{code}")]
    UnknownConcept {
        /// Which part of the rule named the code (`filter`, `concept`, `parent`).
        criteria: &'static str,
        /// Code system URL.
        system: String,
        /// The missing code.
        code: String,
    },

    /// A code was added twice to one code system version.
    #[error("Duplicate code '{code}' in code system {system}")]
    DuplicateConcept {
        /// Code system URL.
        system: String,
        /// The repeated code.
        code: String,
    },

    /// Value set imports refer back to themselves.
    #[error("ValueSet import cycle detected: {chain}")]
    ValueSetCycle {
        /// The import chain, joined with ` -> `.
        chain: String,
    },

    /// The deferred pre-expansion queue cannot take more entries.
    #[error("Deferred pre-expansion queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// I/O error reading terminology files.
    #[error("IO error reading terminology file: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Directory not found.
    #[error("Directory not found: {path}")]
    DirectoryNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Invalid header - column count mismatch.
    #[error("Invalid header: expected {expected} columns, found {found}")]
    InvalidHeader {
        /// Expected column count.
        expected: usize,
        /// Found column count.
        found: usize,
    },

    /// Unexpected column name.
    #[error("Unexpected column '{found}' at position {position}, expected '{expected}'")]
    UnexpectedColumn {
        /// The column position.
        position: usize,
        /// Expected column name.
        expected: String,
        /// Found column name.
        found: String,
    },

    /// A CSV row is missing a required value.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: &'static str,
    },
}

impl TerminologyError {
    /// Creates an [`InvalidParameter`](Self::InvalidParameter) error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Creates an [`UnknownResource`](Self::UnknownResource) error for a value set.
    pub fn unknown_value_set(reference: impl Into<String>) -> Self {
        Self::UnknownResource {
            resource_type: "ValueSet",
            reference: reference.into(),
        }
    }

    /// Creates an [`UnknownCodeSystem`](Self::UnknownCodeSystem) error.
    pub fn unknown_code_system(url: &str, version: Option<&str>) -> Self {
        let canonical = match version {
            Some(version) => format!("{url}|{version}"),
            None => url.to_string(),
        };
        Self::UnknownCodeSystem { canonical }
    }

    /// HTTP-style status a request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidParameter(_) | Self::UnknownConcept { .. } | Self::ValueSetCycle { .. } => {
                400
            }
            Self::UnknownResource { .. } | Self::UnknownCodeSystem { .. } => 404,
            _ => 500,
        }
    }
}

/// Result type for terminology operations.
pub type TerminologyResult<T> = Result<T, TerminologyError>;

/// Configuration of the terminology engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Serve expansions and validations from pre-expansion snapshots and
    /// defer value sets for background materialization.
    pub pre_expand_value_sets: bool,
    /// Maximum number of value sets waiting for pre-expansion.
    pub deferred_queue_capacity: usize,
    /// Largest live expansion, before windowing, that `$expand` will produce.
    pub max_expansion_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pre_expand_value_sets: false,
            deferred_queue_capacity: 1_000,
            max_expansion_size: 1_000,
        }
    }
}

impl EngineConfig {
    /// Creates a config with pre-expansion switched on.
    pub fn with_pre_expansion() -> Self {
        Self {
            pre_expand_value_sets: true,
            ..Self::default()
        }
    }
}

/// Configuration for CSV terminology parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvConfig {
    /// Batch size for processing (affects memory usage).
    pub batch_size: usize,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self { batch_size: 10_000 }
    }
}

/// Files of one custom terminology directory.
#[derive(Debug, Clone, Default)]
pub struct CustomSystemFiles {
    /// Directory holding the files.
    pub directory: PathBuf,
    /// Optional `codesystem.json` header (url, version, name).
    pub header_file: Option<PathBuf>,
    /// `concepts.csv` with `CODE,DISPLAY` columns.
    pub concept_file: PathBuf,
    /// Optional `hierarchy.csv` with `PARENT,CHILD` columns.
    pub hierarchy_file: Option<PathBuf>,
}

/// Discovered terminology files in a data directory.
#[derive(Debug, Clone, Default)]
pub struct TerminologyFiles {
    /// JSON resource files (CodeSystem or ValueSet).
    pub resource_files: Vec<PathBuf>,
    /// Custom CSV terminology directories.
    pub custom_systems: Vec<CustomSystemFiles>,
}

impl TerminologyFiles {
    /// Creates a new empty file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing was discovered.
    pub fn is_empty(&self) -> bool {
        self.resource_files.is_empty() && self.custom_systems.is_empty()
    }
}

/// Statistics from loading a data directory.
#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    /// Code systems registered.
    pub code_systems: usize,
    /// Value sets stored.
    pub value_sets: usize,
    /// Concepts added across all code systems.
    pub concepts: usize,
    /// Files skipped (unknown resource type).
    pub skipped_files: usize,
    /// Time taken to load in milliseconds.
    pub load_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert!(!config.pre_expand_value_sets);
        assert_eq!(config.deferred_queue_capacity, 1_000);
        assert!(EngineConfig::with_pre_expansion().pre_expand_value_sets);
    }

    #[test]
    fn test_unknown_concept_message() {
        let err = TerminologyError::UnknownConcept {
            criteria: "filter",
            system: "http://example.com/my_code_system".to_string(),
            code: "childFOOOOOOO".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid filter criteria - code does not exist: {http://example.com/my_code_system}childFOOOOOOO"
        );
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TerminologyError::invalid_parameter("x").status_code(), 400);
        assert_eq!(TerminologyError::unknown_value_set("http://vs").status_code(), 404);
        assert_eq!(
            TerminologyError::unknown_code_system("http://cs", Some("2")).to_string(),
            "Unknown CodeSystem: http://cs|2"
        );
        assert_eq!(TerminologyError::QueueFull { capacity: 1 }.status_code(), 500);
    }

    #[test]
    fn test_terminology_files_empty() {
        let files = TerminologyFiles::new();
        assert!(files.is_empty());
    }
}
