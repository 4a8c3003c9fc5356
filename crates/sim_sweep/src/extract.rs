//! Metric extraction from simulator output.
//!
//! Each configured field is searched independently. A field that cannot be
//! found is recorded as absent; extraction itself never fails.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::runner::RawOutput;

/// Signed integer or decimal literal with optional exponent.
const NUMBER: &str = r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?";

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern for metric '{name}' is not a valid regex: {source}")]
    Invalid {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("pattern for metric '{name}' must have exactly one capture group, found {groups}")]
    CaptureGroups { name: String, groups: usize },
    #[error("metric '{name}' has a non-positive scale divisor")]
    Divisor { name: String },
}

#[derive(Debug, Clone)]
enum Matcher {
    Pattern(Regex),
    /// Comma-separated field of the first non-empty line.
    Column(usize),
}

/// How one named metric is located in the output.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    name: String,
    matcher: Matcher,
    divisor: Option<f64>,
}

impl FieldPattern {
    /// Match `<label> = <number>`.
    pub fn labelled(name: impl Into<String>, label: &str) -> Self {
        let pattern = format!(r"{}\s*=\s*({NUMBER})", regex::escape(label));
        Self {
            name: name.into(),
            matcher: Matcher::Pattern(
                Regex::new(&pattern).expect("escaped label always forms a valid pattern"),
            ),
            divisor: None,
        }
    }

    /// Caller-supplied regex whose single capture group is the number.
    pub fn regex(name: impl Into<String>, pattern: &str) -> Result<Self, PatternError> {
        let name = name.into();
        let regex = Regex::new(pattern).map_err(|source| PatternError::Invalid {
            name: name.clone(),
            source,
        })?;
        let groups = regex.captures_len() - 1;
        if groups != 1 {
            return Err(PatternError::CaptureGroups { name, groups });
        }
        Ok(Self {
            name,
            matcher: Matcher::Pattern(regex),
            divisor: None,
        })
    }

    /// The `index`-th comma-separated value of the first non-empty line.
    pub fn column(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            matcher: Matcher::Column(index),
            divisor: None,
        }
    }

    /// Divide every extracted value, e.g. counts over a run length into rates.
    pub fn scaled(mut self, divisor: f64) -> Result<Self, PatternError> {
        if divisor.is_nan() || divisor <= 0.0 {
            return Err(PatternError::Divisor { name: self.name });
        }
        self.divisor = Some(divisor);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, stdout: &str) -> Option<f64> {
        let value = match &self.matcher {
            Matcher::Pattern(regex) => {
                let captures = regex.captures(stdout)?;
                captures.get(1)?.as_str().trim().parse::<f64>().ok()?
            }
            Matcher::Column(index) => {
                let line = stdout.lines().map(str::trim).find(|line| !line.is_empty())?;
                line.split(',').nth(*index)?.trim().parse::<f64>().ok()?
            }
        };
        Some(match self.divisor {
            Some(divisor) => value / divisor,
            None => value,
        })
    }
}

/// Extracted metrics of one execution, in configured field order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MetricRecord {
    fields: Vec<(String, Option<f64>)>,
}

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<f64>) {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.insert(name, value);
        self
    }

    /// Value of a field; `None` when absent or not configured.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .and_then(|(_, value)| *value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(existing, _)| existing == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Names of the fields that were not found.
    pub fn gaps(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.fields.iter().all(|(_, value)| value.is_some())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A fixed set of field patterns applied to every run.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    fields: Vec<FieldPattern>,
}

impl Extractor {
    pub fn new(fields: Vec<FieldPattern>) -> Self {
        Self { fields }
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.name.clone()).collect()
    }

    /// Consume one run's output. The first match of each field wins.
    pub fn extract(&self, output: RawOutput) -> MetricRecord {
        extract(&output.stdout, &self.fields)
    }
}

pub fn extract(stdout: &str, fields: &[FieldPattern]) -> MetricRecord {
    let mut record = MetricRecord::new();
    for field in fields {
        record.insert(field.name.clone(), field.find(stdout));
    }
    record
}
