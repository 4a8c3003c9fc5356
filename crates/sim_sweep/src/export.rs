//! Result persistence.
//!
//! A result file is a CSV table (parameter columns, then metric columns) with a
//! JSON manifest next to it (`<file>.manifest.json`) recording which experiment
//! produced it and how the columns split. Tables can also be exported as JSON.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::table::{AggregatedRow, ResultTable, TableError};

#[path = "export/csv.rs"]
mod csv;
#[path = "export/json.rs"]
mod json;
#[path = "export/manifest.rs"]
mod manifest;
#[path = "export/writer_utils.rs"]
mod writer_utils;

pub use manifest::{ColumnKind, Manifest, Provenance};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored results at {}; run the sweep first", .path.display())]
    NotFound { path: PathBuf },
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed CSV in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: ::csv::Error,
    },
    #[error("malformed JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected header in {}: {reason}", .path.display())]
    Header { path: PathBuf, reason: String },
    #[error("{} line {line}: value '{value}' in column '{column}' is not a number", .path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
    },
    #[error("invalid rows in {}: {source}", .path.display())]
    Rows {
        path: PathBuf,
        #[source]
        source: TableError,
    },
}

/// How a loaded header is split into parameter and metric columns.
enum Layout<'a> {
    Leading(usize),
    Expected(&'a [String], &'a [String]),
}

/// Reads and writes one result file and its manifest.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
    provenance: Option<Provenance>,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            provenance: None,
        }
    }

    /// Stamp saved manifests with the producing experiment.
    pub fn with_provenance(mut self, experiment: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        self.provenance = Some(Provenance {
            experiment: experiment.into(),
            fingerprint: fingerprint.into(),
        });
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest_path(&self) -> PathBuf {
        writer_utils::with_suffix(&self.path, ".manifest.json")
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn save(&self, table: &ResultTable) -> Result<(), StoreError> {
        self.save_with_failures(table, 0)
    }

    /// Persist `table`, replacing any previous results. `failures` is the number
    /// of configurations that produced no row and is recorded in the manifest.
    pub fn save_with_failures(&self, table: &ResultTable, failures: usize) -> Result<(), StoreError> {
        writer_utils::write_atomically(&self.path, |file| {
            csv::write_table(table, file).map_err(|source| StoreError::Csv {
                path: self.path.clone(),
                source,
            })
        })?;

        let manifest = Manifest::describe(table, self.provenance.as_ref(), failures);
        let manifest_path = self.manifest_path();
        writer_utils::write_atomically(&manifest_path, |file| {
            manifest::write_manifest(&manifest, file).map_err(|source| StoreError::Json {
                path: manifest_path.clone(),
                source,
            })
        })
    }

    /// Load using the column split recorded in the manifest.
    pub fn load(&self) -> Result<ResultTable, StoreError> {
        self.ensure_exists()?;
        let manifest = self.read_manifest()?.ok_or_else(|| StoreError::Header {
            path: self.path.clone(),
            reason: format!(
                "no manifest at {}; the column split must be given explicitly",
                self.manifest_path().display()
            ),
        })?;
        self.read(
            Layout::Expected(&manifest.parameters, &manifest.metrics),
            &manifest.parameter_kinds,
        )
    }

    /// Load treating the first `parameter_count` columns as parameters.
    pub fn load_with_layout(&self, parameter_count: usize) -> Result<ResultTable, StoreError> {
        self.ensure_exists()?;
        self.read(Layout::Leading(parameter_count), &[])
    }

    /// Load and require exactly the given columns. Parameter kinds come from the
    /// manifest when it describes the same parameters.
    pub fn load_expecting(&self, parameters: &[String], metrics: &[String]) -> Result<ResultTable, StoreError> {
        self.ensure_exists()?;
        let kinds = self
            .read_manifest()?
            .filter(|manifest| manifest.parameters == parameters)
            .map(|manifest| manifest.parameter_kinds)
            .unwrap_or_default();
        self.read(Layout::Expected(parameters, metrics), &kinds)
    }

    /// The manifest, or `None` when the result file has none.
    pub fn read_manifest(&self) -> Result<Option<Manifest>, StoreError> {
        let path = self.manifest_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        manifest::read_manifest(file)
            .map(Some)
            .map_err(|source| StoreError::Json { path, source })
    }

    fn ensure_exists(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                path: self.path.clone(),
            })
        }
    }

    /// Parameter columns without a recorded kind are inferred field by field.
    fn read(&self, layout: Layout<'_>, kinds: &[ColumnKind]) -> Result<ResultTable, StoreError> {
        let file = File::open(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        let (header, records) = csv::read_records(file).map_err(|source| StoreError::Csv {
            path: self.path.clone(),
            source,
        })?;

        let parameter_count = match layout {
            Layout::Leading(count) => {
                if count > header.len() {
                    return Err(self.header_error(format!(
                        "{count} parameter columns requested, file has {} columns",
                        header.len()
                    )));
                }
                count
            }
            Layout::Expected(parameters, metrics) => {
                let expected: Vec<&String> = parameters.iter().chain(metrics).collect();
                let found: Vec<&String> = header.iter().collect();
                if expected != found {
                    return Err(self.header_error(format!(
                        "expected [{}], found [{}]",
                        join(&expected),
                        join(&found)
                    )));
                }
                parameters.len()
            }
        };

        let (parameters, metrics) = header.split_at(parameter_count);
        let mut table = ResultTable::new(parameters.to_vec(), metrics.to_vec());
        for (line, record) in records {
            let values: Vec<&str> = record.iter().collect();
            let (parameter_fields, metric_fields) = values.split_at(parameter_count.min(values.len()));

            let mut parameter_values = Vec::with_capacity(parameter_fields.len());
            for (index, (column, text)) in parameters.iter().zip(parameter_fields).enumerate() {
                let kind = kinds.get(index).copied().unwrap_or(ColumnKind::Mixed);
                let value = kind.parse(text).ok_or_else(|| StoreError::Parse {
                    path: self.path.clone(),
                    line,
                    column: column.clone(),
                    value: text.to_string(),
                })?;
                parameter_values.push(value);
            }
            let mut metric_values = Vec::with_capacity(metric_fields.len());
            for (column, text) in metrics.iter().zip(metric_fields) {
                metric_values.push(self.parse_metric(line, column, text)?);
            }

            table
                .push(AggregatedRow::new(parameter_values, metric_values))
                .map_err(|source| StoreError::Rows {
                    path: self.path.clone(),
                    source,
                })?;
        }
        Ok(table)
    }

    fn parse_metric(&self, line: u64, column: &str, text: &str) -> Result<Option<f64>, StoreError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<f64>()
            .map(Some)
            .map_err(|_| StoreError::Parse {
                path: self.path.clone(),
                line,
                column: column.to_string(),
                value: text.to_string(),
            })
    }

    fn header_error(&self, reason: String) -> StoreError {
        StoreError::Header {
            path: self.path.clone(),
            reason,
        }
    }
}

/// Write `table` as a JSON document with its column layout and rows.
pub fn export_json(table: &ResultTable, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    let file = writer_utils::create_output_file(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    json::write_table(table, file).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn join(columns: &[&String]) -> String {
    columns
        .iter()
        .map(|column| column.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
