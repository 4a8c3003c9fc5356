//! Parameter variation framework for experiment sweeps.
//!
//! A [`ParameterSpace`] is an ordered list of declarations: swept dimensions,
//! fixed settings and derived settings. Grid generation walks the Cartesian
//! product of the swept dimensions (first declared dimension varies slowest) and
//! yields one immutable [`Configuration`] per point. The same space always yields
//! the same sequence.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod combinations;
mod trials;
mod values;

pub use combinations::Configurations;
pub use trials::{SeedInjection, TrialPlan};
pub use values::{format_float, ParamValue, Values};

/// How a setting reaches the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Injection {
    /// Build-time `-DNAME=VALUE` definition.
    #[default]
    Define,
    /// Positional run-time argument, in declaration order.
    Arg,
}

/// One declaration in a parameter space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    /// Swept dimension; recorded as a result column.
    Sweep {
        name: String,
        values: Values,
        #[serde(default)]
        injection: Injection,
    },
    /// Constant setting; injected but not recorded.
    Fixed {
        name: String,
        value: ParamValue,
        #[serde(default)]
        injection: Injection,
    },
    /// Recorded setting computed as `source * factor / divisor`.
    Derived {
        name: String,
        source: String,
        #[serde(default = "unit")]
        factor: f64,
        #[serde(default = "unit")]
        divisor: f64,
        #[serde(default)]
        injection: Injection,
    },
}

fn unit() -> f64 {
    1.0
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Sweep { name, .. }
            | Declaration::Fixed { name, .. }
            | Declaration::Derived { name, .. } => name,
        }
    }

    pub fn injection(&self) -> Injection {
        match self {
            Declaration::Sweep { injection, .. }
            | Declaration::Fixed { injection, .. }
            | Declaration::Derived { injection, .. } => *injection,
        }
    }

    /// Whether the setting becomes a column of the result table.
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Declaration::Fixed { .. })
    }
}

/// A concrete setting within a configuration.
#[derive(Debug, Clone)]
pub struct Setting {
    pub name: String,
    pub value: ParamValue,
    pub injection: Injection,
    pub recorded: bool,
}

/// One point of the parameter space.
///
/// Equality compares the ordered name/value pairs only.
#[derive(Debug, Clone)]
pub struct Configuration {
    settings: Vec<Setting>,
}

impl Configuration {
    pub(crate) fn new(settings: Vec<Setting>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.settings
            .iter()
            .find(|setting| setting.name == name)
            .map(|setting| &setting.value)
    }

    /// `(name, value)` pairs for build-time definitions.
    pub fn definitions(&self) -> Vec<(String, String)> {
        self.settings
            .iter()
            .filter(|setting| setting.injection == Injection::Define)
            .map(|setting| (setting.name.clone(), setting.value.to_string()))
            .collect()
    }

    /// Positional run-time arguments in declaration order.
    pub fn run_args(&self) -> Vec<String> {
        self.settings
            .iter()
            .filter(|setting| setting.injection == Injection::Arg)
            .map(|setting| setting.value.to_string())
            .collect()
    }

    pub fn recorded_names(&self) -> Vec<String> {
        self.settings
            .iter()
            .filter(|setting| setting.recorded)
            .map(|setting| setting.name.clone())
            .collect()
    }

    pub fn recorded_values(&self) -> Vec<ParamValue> {
        self.settings
            .iter()
            .filter(|setting| setting.recorded)
            .map(|setting| setting.value.clone())
            .collect()
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.settings.len() == other.settings.len()
            && self
                .settings
                .iter()
                .zip(other.settings.iter())
                .all(|(left, right)| left.name == right.name && left.value == right.value)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, setting) in self.settings.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", setting.name, setting.value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpaceError {
    #[error("parameter names must be non-empty")]
    EmptyName,
    #[error("parameter '{0}' is declared more than once")]
    DuplicateName(String),
    #[error("swept parameter '{0}' has no values")]
    NoValues(String),
    #[error("swept parameter '{0}' has a non-positive step")]
    InvalidStep(String),
    #[error("swept parameter '{name}' repeats the value {value}")]
    DuplicateValue { name: String, value: String },
    #[error("derived parameter '{name}' refers to unknown parameter '{source_name}'")]
    UnknownSource { name: String, source_name: String },
    #[error("derived parameter '{name}' needs numeric values from '{source_name}'")]
    NonNumericSource { name: String, source_name: String },
    #[error("derived parameter '{0}' has a zero divisor")]
    ZeroDivisor(String),
    #[error("trial plan has no seeds")]
    NoSeeds,
}

/// Defines a parameter space for exploration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSpace {
    declarations: Vec<Declaration>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new parameter space for grid search.
    pub fn grid() -> Self {
        Self::new()
    }

    /// Add a swept dimension.
    pub fn sweep(mut self, name: impl Into<String>, values: Values, injection: Injection) -> Self {
        self.declarations.push(Declaration::Sweep {
            name: name.into(),
            values,
            injection,
        });
        self
    }

    /// Add a constant setting that is injected but not recorded.
    pub fn fixed(
        mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
        injection: Injection,
    ) -> Self {
        self.declarations.push(Declaration::Fixed {
            name: name.into(),
            value: value.into(),
            injection,
        });
        self
    }

    /// Add a recorded setting computed from another parameter.
    pub fn derived(
        mut self,
        name: impl Into<String>,
        source: impl Into<String>,
        factor: f64,
        divisor: f64,
        injection: Injection,
    ) -> Self {
        self.declarations.push(Declaration::Derived {
            name: name.into(),
            source: source.into(),
            factor,
            divisor,
            injection,
        });
        self
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Names of the recorded columns, in declaration order.
    pub fn recorded_names(&self) -> Vec<String> {
        self.declarations
            .iter()
            .filter(|declaration| declaration.is_recorded())
            .map(|declaration| declaration.name().to_string())
            .collect()
    }

    pub fn validate(&self) -> Result<(), SpaceError> {
        let mut seen = HashSet::new();
        for declaration in &self.declarations {
            let name = declaration.name();
            if name.trim().is_empty() {
                return Err(SpaceError::EmptyName);
            }
            if !seen.insert(name) {
                return Err(SpaceError::DuplicateName(name.to_string()));
            }
            if let Declaration::Sweep { values, .. } = declaration {
                if !values.has_valid_step() {
                    return Err(SpaceError::InvalidStep(name.to_string()));
                }
                let materialized = values.materialize();
                if materialized.is_empty() {
                    return Err(SpaceError::NoValues(name.to_string()));
                }
                for (index, value) in materialized.iter().enumerate() {
                    if materialized[..index].contains(value) {
                        return Err(SpaceError::DuplicateValue {
                            name: name.to_string(),
                            value: value.to_string(),
                        });
                    }
                }
            }
        }

        for declaration in &self.declarations {
            if let Declaration::Derived {
                name,
                source,
                divisor,
                ..
            } = declaration
            {
                if *divisor == 0.0 {
                    return Err(SpaceError::ZeroDivisor(name.clone()));
                }
                let numeric = match self.find(source) {
                    Some(Declaration::Sweep { values, .. }) => {
                        values.materialize().iter().all(ParamValue::is_numeric)
                    }
                    Some(Declaration::Fixed { value, .. }) => value.is_numeric(),
                    Some(Declaration::Derived { .. }) | None => {
                        return Err(SpaceError::UnknownSource {
                            name: name.clone(),
                            source_name: source.clone(),
                        })
                    }
                };
                if !numeric {
                    return Err(SpaceError::NonNumericSource {
                        name: name.clone(),
                        source_name: source.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Lazily enumerate every configuration using grid search.
    pub fn generate(&self) -> Result<Configurations, SpaceError> {
        self.validate()?;
        Ok(Configurations::new(&self.declarations))
    }

    fn find(&self, name: &str) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|declaration| declaration.name() == name)
    }
}

#[cfg(test)]
mod tests;
