//! Generic CSV terminology file parser.
//!
//! Provides a streaming parser for the comma-separated files of a custom
//! terminology directory (`concepts.csv`, `hierarchy.csv`).

use std::fs::File;
use std::io::{BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord};

use crate::types::{CsvConfig, TerminologyError, TerminologyResult};

/// Trait for types that can be parsed from CSV records.
pub trait CsvRecord: Sized {
    /// Expected column names for this record type.
    const EXPECTED_COLUMNS: &'static [&'static str];

    /// Parse a record from a CSV StringRecord.
    fn from_record(record: &StringRecord) -> TerminologyResult<Self>;
}

/// A `concepts.csv` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptRow {
    /// The concept code.
    pub code: String,
    /// Display text, if any.
    pub display: Option<String>,
}

impl CsvRecord for ConceptRow {
    const EXPECTED_COLUMNS: &'static [&'static str] = &["CODE", "DISPLAY"];

    fn from_record(record: &StringRecord) -> TerminologyResult<Self> {
        Ok(Self {
            code: parse::required(record, 0, "CODE")?,
            display: parse::optional(record, 1),
        })
    }
}

/// A `hierarchy.csv` row linking a child under a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyRow {
    /// Parent code.
    pub parent: String,
    /// Child code.
    pub child: String,
}

impl CsvRecord for HierarchyRow {
    const EXPECTED_COLUMNS: &'static [&'static str] = &["PARENT", "CHILD"];

    fn from_record(record: &StringRecord) -> TerminologyResult<Self> {
        Ok(Self {
            parent: parse::required(record, 0, "PARENT")?,
            child: parse::required(record, 1, "CHILD")?,
        })
    }
}

/// A streaming parser for CSV terminology files.
///
/// This parser reads files record-by-record to avoid loading
/// entire files into memory.
pub struct CsvParser<R: Read, T: CsvRecord> {
    reader: Reader<R>,
    config: CsvConfig,
    records_read: usize,
    _marker: PhantomData<T>,
}

impl<T: CsvRecord> CsvParser<BufReader<File>, T> {
    /// Creates a new parser from a file path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or has invalid headers.
    pub fn from_path<P: AsRef<Path>>(path: P, config: CsvConfig) -> TerminologyResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(TerminologyError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), config)
    }
}

impl<R: Read, T: CsvRecord> CsvParser<R, T> {
    /// Creates a new parser from a reader.
    pub fn from_reader(reader: R, config: CsvConfig) -> TerminologyResult<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        Self::validate_headers(&mut csv_reader)?;

        Ok(Self {
            reader: csv_reader,
            config,
            records_read: 0,
            _marker: PhantomData,
        })
    }

    /// Validates that the file has the expected column headers.
    fn validate_headers(reader: &mut Reader<R>) -> TerminologyResult<()> {
        let headers = reader.headers()?;
        let expected = T::EXPECTED_COLUMNS;

        if headers.len() < expected.len() {
            return Err(TerminologyError::InvalidHeader {
                expected: expected.len(),
                found: headers.len(),
            });
        }

        for (i, expected_col) in expected.iter().enumerate() {
            let found = headers.get(i).unwrap_or("");
            // Handle UTF-8 BOM at start of file
            let found = found.trim_start_matches('\u{feff}');
            if !found.eq_ignore_ascii_case(expected_col) {
                return Err(TerminologyError::UnexpectedColumn {
                    position: i,
                    expected: expected_col.to_string(),
                    found: found.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Returns the number of records read so far.
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Parses all records into a Vec, failing on the first bad row.
    pub fn parse_all(self) -> TerminologyResult<Vec<T>> {
        self.collect()
    }

    /// Parses records in batches, calling the callback for each batch.
    pub fn parse_batched<F>(mut self, mut callback: F) -> TerminologyResult<usize>
    where
        F: FnMut(Vec<T>) -> TerminologyResult<()>,
    {
        let batch_size = self.config.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0;

        for record in self.by_ref() {
            batch.push(record?);
            if batch.len() >= batch_size {
                total += batch.len();
                callback(std::mem::replace(&mut batch, Vec::with_capacity(batch_size)))?;
            }
        }

        if !batch.is_empty() {
            total += batch.len();
            callback(batch)?;
        }

        Ok(total)
    }
}

impl<R: Read, T: CsvRecord> Iterator for CsvParser<R, T> {
    type Item = TerminologyResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut record = StringRecord::new();
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    self.records_read += 1;

                    // Skip empty records
                    if record.is_empty() || record.iter().all(|f| f.trim().is_empty()) {
                        continue;
                    }

                    return Some(T::from_record(&record));
                }
                Ok(false) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Helper functions for reading CSV field values.
pub mod parse {
    use csv::StringRecord;

    use super::{TerminologyError, TerminologyResult};

    /// Reads a non-empty field.
    pub fn required(
        record: &StringRecord,
        index: usize,
        field: &'static str,
    ) -> TerminologyResult<String> {
        optional(record, index).ok_or(TerminologyError::MissingField { field })
    }

    /// Reads a field, treating blanks as absent.
    pub fn optional(record: &StringRecord, index: usize) -> Option<String> {
        record
            .get(index)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}
