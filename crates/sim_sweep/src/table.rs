//! In-memory result table: one row per configuration, in enumeration order.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::MetricRecord;
use crate::parameters::ParamValue;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("row has {found} parameter values, table has {expected} parameter columns")]
    ParameterArity { expected: usize, found: usize },
    #[error("row has {found} metric values, table has {expected} metric columns")]
    MetricArity { expected: usize, found: usize },
    #[error("a row for parameters [{0}] already exists")]
    Duplicate(String),
}

/// Recorded parameter values of one configuration plus its aggregated metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub parameters: Vec<ParamValue>,
    pub metrics: Vec<Option<f64>>,
}

impl AggregatedRow {
    pub fn new(parameters: Vec<ParamValue>, metrics: Vec<Option<f64>>) -> Self {
        Self { parameters, metrics }
    }

    /// Take metric values from `record` in the order of `names`. Names missing
    /// from the record become absent values.
    pub fn from_record(parameters: Vec<ParamValue>, names: &[String], record: &MetricRecord) -> Self {
        let metrics = names.iter().map(|name| record.get(name)).collect();
        Self { parameters, metrics }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    parameters: Vec<String>,
    metrics: Vec<String>,
    rows: Vec<AggregatedRow>,
}

impl ResultTable {
    pub fn new(parameters: Vec<String>, metrics: Vec<String>) -> Self {
        Self {
            parameters,
            metrics,
            rows: Vec::new(),
        }
    }

    /// Append a row, rejecting arity mismatches and repeated parameter values.
    pub fn push(&mut self, row: AggregatedRow) -> Result<(), TableError> {
        if row.parameters.len() != self.parameters.len() {
            return Err(TableError::ParameterArity {
                expected: self.parameters.len(),
                found: row.parameters.len(),
            });
        }
        if row.metrics.len() != self.metrics.len() {
            return Err(TableError::MetricArity {
                expected: self.metrics.len(),
                found: row.metrics.len(),
            });
        }
        if self.rows.iter().any(|existing| existing.parameters == row.parameters) {
            let values: Vec<String> = row.parameters.iter().map(ToString::to_string).collect();
            return Err(TableError::Duplicate(values.join(", ")));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn rows(&self) -> &[AggregatedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All column names: parameters first, then metrics.
    pub fn header(&self) -> Vec<String> {
        self.parameters.iter().chain(self.metrics.iter()).cloned().collect()
    }

    /// Numeric view of any column by name. Text parameters and absent metrics
    /// yield `None`; an unknown name yields `None` for the whole column.
    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        if let Some(index) = self.parameters.iter().position(|column| column == name) {
            return Some(
                self.rows
                    .iter()
                    .map(|row| row.parameters[index].as_f64())
                    .collect(),
            );
        }
        let index = self.metrics.iter().position(|column| column == name)?;
        Some(self.rows.iter().map(|row| row.metrics[index]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ResultTable {
        ResultTable::new(
            vec!["B".to_string()],
            vec!["rejected".to_string(), "transmitted".to_string()],
        )
    }

    #[test]
    fn test_push_keeps_insertion_order() {
        let mut table = table();
        for b in [2, 1, 3] {
            table
                .push(AggregatedRow::new(
                    vec![ParamValue::Int(b)],
                    vec![Some(b as f64), None],
                ))
                .unwrap();
        }
        let order: Vec<_> = table.rows().iter().map(|row| row.parameters[0].clone()).collect();
        assert_eq!(order, vec![ParamValue::Int(2), ParamValue::Int(1), ParamValue::Int(3)]);
        assert_eq!(table.header(), vec!["B", "rejected", "transmitted"]);
    }

    #[test]
    fn test_duplicate_parameters_are_rejected() {
        let mut table = table();
        let row = AggregatedRow::new(vec![ParamValue::Int(1)], vec![Some(1.0), Some(2.0)]);
        table.push(row.clone()).unwrap();
        assert_eq!(table.push(row), Err(TableError::Duplicate("1".to_string())));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_arity_is_checked() {
        let mut table = table();
        let error = table
            .push(AggregatedRow::new(vec![], vec![Some(1.0), None]))
            .unwrap_err();
        assert_eq!(error, TableError::ParameterArity { expected: 1, found: 0 });

        let error = table
            .push(AggregatedRow::new(vec![ParamValue::Int(1)], vec![None]))
            .unwrap_err();
        assert_eq!(error, TableError::MetricArity { expected: 2, found: 1 });
    }

    #[test]
    fn test_row_from_record_follows_column_order() {
        let record = MetricRecord::new()
            .with("transmitted", Some(10.0))
            .with("rejected", Some(1.0));
        let names = vec!["rejected".to_string(), "transmitted".to_string()];
        let row = AggregatedRow::from_record(vec![ParamValue::Int(1)], &names, &record);
        assert_eq!(row.metrics, vec![Some(1.0), Some(10.0)]);
    }

    #[test]
    fn test_numeric_columns() {
        let mut table = table();
        table
            .push(AggregatedRow::new(vec![ParamValue::Int(4)], vec![None, Some(20.0)]))
            .unwrap();
        assert_eq!(table.numeric_column("B"), Some(vec![Some(4.0)]));
        assert_eq!(table.numeric_column("rejected"), Some(vec![None]));
        assert_eq!(table.numeric_column("delay"), None);
    }
}
