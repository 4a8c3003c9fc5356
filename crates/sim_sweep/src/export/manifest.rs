use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use serde::{Deserialize, Serialize};

use crate::parameters::ParamValue;
use crate::table::ResultTable;

/// Sidecar describing how a result file was produced and how its columns split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub experiment: String,
    /// Fingerprint of the definition that produced the results.
    pub fingerprint: Option<String>,
    pub parameters: Vec<String>,
    /// Value kind of each parameter column, parallel to `parameters`.
    #[serde(default)]
    pub parameter_kinds: Vec<ColumnKind>,
    pub metrics: Vec<String>,
    pub rows: usize,
    /// Configurations that failed and have no row.
    pub failures: usize,
}

impl Manifest {
    pub fn describe(table: &ResultTable, provenance: Option<&Provenance>, failures: usize) -> Self {
        Self {
            experiment: provenance
                .map(|provenance| provenance.experiment.clone())
                .unwrap_or_default(),
            fingerprint: provenance.map(|provenance| provenance.fingerprint.clone()),
            parameters: table.parameters().to_vec(),
            parameter_kinds: (0..table.parameters().len())
                .map(|column| ColumnKind::of(table.rows().iter().map(|row| &row.parameters[column])))
                .collect(),
            metrics: table.metrics().to_vec(),
            rows: table.len(),
            failures,
        }
    }
}

/// How the text of a parameter column is turned back into values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Int,
    Float,
    Text,
    /// Values of different kinds, or no rows; each field is inferred.
    Mixed,
}

impl ColumnKind {
    pub fn of<'a>(values: impl Iterator<Item = &'a ParamValue>) -> Self {
        let mut kinds = values.map(|value| match value {
            ParamValue::Int(_) => ColumnKind::Int,
            ParamValue::Float(_) => ColumnKind::Float,
            ParamValue::Text(_) => ColumnKind::Text,
        });
        let Some(first) = kinds.next() else {
            return ColumnKind::Mixed;
        };
        if kinds.all(|kind| kind == first) {
            first
        } else {
            ColumnKind::Mixed
        }
    }

    /// `None` when the text is not a value of this kind.
    pub fn parse(self, text: &str) -> Option<ParamValue> {
        match self {
            ColumnKind::Int => text.trim().parse().ok().map(ParamValue::Int),
            ColumnKind::Float => text.trim().parse().ok().map(ParamValue::Float),
            ColumnKind::Text => Some(ParamValue::Text(text.to_string())),
            ColumnKind::Mixed => Some(ParamValue::parse(text)),
        }
    }
}

/// Which experiment definition produced a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub experiment: String,
    pub fingerprint: String,
}

pub(crate) fn write_manifest(manifest: &Manifest, file: File) -> Result<(), serde_json::Error> {
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, manifest)?;
    writer.flush().map_err(serde_json::Error::io)
}

pub(crate) fn read_manifest(file: File) -> Result<Manifest, serde_json::Error> {
    serde_json::from_reader(BufReader::new(file))
}
