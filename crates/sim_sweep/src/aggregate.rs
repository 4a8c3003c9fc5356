//! Reduction of per-trial metric records into one record per configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::MetricRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("cannot aggregate an empty set of trial records")]
    Empty,
}

/// How the present values of one metric are combined across trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    #[default]
    Mean,
    Median,
    Min,
    Max,
}

impl Reduction {
    /// `None` when there is nothing to reduce.
    pub fn reduce(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let value = match self {
            Reduction::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Reduction::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Reduction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Reduction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(value)
    }
}

/// Combine trial records field by field.
///
/// Field order follows the first record. Each field is reduced over the trials
/// where it is present; a field absent from every trial stays absent.
pub fn aggregate(records: &[MetricRecord], reduction: Reduction) -> Result<MetricRecord, AggregateError> {
    let first = records.first().ok_or(AggregateError::Empty)?;

    let mut combined = MetricRecord::new();
    for name in first.names() {
        let present: Vec<f64> = records.iter().filter_map(|record| record.get(name)).collect();
        combined.insert(name, reduction.reduce(&present));
    }
    Ok(combined)
}
