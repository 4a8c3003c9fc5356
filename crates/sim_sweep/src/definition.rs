//! JSON experiment definitions.
//!
//! A definition is plain data: how to build the simulator, how to run it, which
//! parameters to sweep, which metrics to extract and which charts to draw.
//! [`ExperimentDefinition::compile`] validates it and turns it into the
//! components the sweep driver works with.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::aggregate::Reduction;
use crate::builder::{CompilerBuilder, SourceSelector};
use crate::export::ResultStore;
use crate::extract::{Extractor, FieldPattern, PatternError};
use crate::parameters::{ParameterSpace, SeedInjection, SpaceError, TrialPlan};
use crate::plot::ChartSpec;
use crate::runner::{ProcessRunner, DEFAULT_RUN_TIMEOUT};
use crate::sweep::{BuildPolicy, Experiment};

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read definition {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse definition {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("experiment id cannot be empty")]
    EmptyId,
    #[error("experiment '{0}' extracts no metrics")]
    NoMetrics(String),
    #[error("metric '{0}' is defined more than once")]
    DuplicateMetric(String),
    #[error("metric '{0}' has the same name as a parameter")]
    MetricShadowsParameter(String),
    #[error("chart '{chart}' refers to unknown column '{column}'")]
    UnknownChartColumn { chart: String, column: String },
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Where a metric's value is found in the simulator output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    /// `<label> = <number>`
    Label(String),
    /// Custom regex with one capture group.
    Regex(String),
    /// Field of a comma-separated output line.
    Column(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    #[serde(flatten)]
    pub source: MetricSource,
    /// Every extracted value is divided by this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

impl MetricDefinition {
    pub fn label(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: MetricSource::Label(label.into()),
            scale: None,
        }
    }

    pub fn column(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            source: MetricSource::Column(index),
            scale: None,
        }
    }

    pub fn scaled(mut self, divisor: f64) -> Self {
        self.scale = Some(divisor);
        self
    }

    fn pattern(&self) -> Result<FieldPattern, PatternError> {
        let pattern = match &self.source {
            MetricSource::Label(label) => FieldPattern::labelled(&self.name, label),
            MetricSource::Regex(regex) => FieldPattern::regex(&self.name, regex)?,
            MetricSource::Column(index) => FieldPattern::column(&self.name, *index),
        };
        match self.scale {
            Some(divisor) => pattern.scaled(divisor),
            None => Ok(pattern),
        }
    }
}

fn default_compiler() -> String {
    "gcc".to_string()
}

fn default_flags() -> Vec<String> {
    vec!["-O2".to_string(), "-Wall".to_string()]
}

fn default_libraries() -> Vec<String> {
    vec!["-lm".to_string()]
}

fn default_artifact() -> PathBuf {
    PathBuf::from("run")
}

fn default_timeout_secs() -> Option<u64> {
    Some(DEFAULT_RUN_TIMEOUT.as_secs())
}

fn default_results_file() -> PathBuf {
    PathBuf::from("results.csv")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDefinition {
    #[serde(default = "default_compiler")]
    pub compiler: String,
    #[serde(default = "default_flags")]
    pub flags: Vec<String>,
    pub sources: SourceSelector,
    #[serde(default = "default_libraries")]
    pub libraries: Vec<String>,
    #[serde(default = "default_artifact")]
    pub artifact: PathBuf,
    #[serde(default)]
    pub policy: BuildPolicy,
}

impl BuildDefinition {
    pub fn new(sources: SourceSelector) -> Self {
        Self {
            compiler: default_compiler(),
            flags: default_flags(),
            sources,
            libraries: default_libraries(),
            artifact: default_artifact(),
            policy: BuildPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDefinition {
    /// `null` waits indefinitely.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Default for RunDefinition {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub build: BuildDefinition,
    #[serde(default)]
    pub run: RunDefinition,
    pub space: ParameterSpace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trials: Option<TrialPlan>,
    pub metrics: Vec<MetricDefinition>,
    #[serde(default)]
    pub reduction: Reduction,
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
    /// Relative paths resolve against the output directory.
    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,
}

/// What [`ExperimentDefinition::fingerprint`] hashes.
#[derive(Serialize)]
struct ResultInputs<'a> {
    build: &'a BuildDefinition,
    space: &'a ParameterSpace,
    trials: Option<&'a TrialPlan>,
    metrics: &'a [MetricDefinition],
    reduction: Reduction,
}

impl ExperimentDefinition {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| DefinitionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| DefinitionError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).expect("serialization of definition should not fail")
    }

    /// SHA-256 over the parts of the definition that determine the results:
    /// build, space, trials, metrics and reduction. Timeouts, description and
    /// charts can change without invalidating saved results.
    pub fn fingerprint(&self) -> String {
        let inputs = ResultInputs {
            build: &self.build,
            space: &self.space,
            trials: self.trials.as_ref(),
            metrics: &self.metrics,
            reduction: self.reduction,
        };
        let mut hasher = Sha256::new();
        hasher.update(
            serde_json::to_string(&inputs).expect("serialization of definition should not fail"),
        );
        format!("{:x}", hasher.finalize())
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        self.extractor().map(|_| ())
    }

    /// Validate and assemble the experiment the sweep driver runs.
    pub fn compile(&self) -> Result<Experiment, DefinitionError> {
        let extractor = self.extractor()?;
        let mut experiment = Experiment::new(&self.id, self.space.clone(), extractor)
            .reduction(self.reduction)
            .build_policy(self.build.policy)
            .artifact(&self.build.artifact);
        if let Some(trials) = &self.trials {
            experiment = experiment.trials(trials.clone());
        }
        Ok(experiment)
    }

    pub fn builder(&self) -> CompilerBuilder {
        CompilerBuilder::new(self.build.sources.clone())
            .compiler(&self.build.compiler)
            .flags(self.build.flags.clone())
            .libraries(self.build.libraries.clone())
    }

    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new()
            .timeout(self.run.timeout_secs.map(Duration::from_secs))
            .working_dir(self.run.working_dir.clone())
    }

    /// Result store under `out_dir`, stamped with this definition's provenance.
    pub fn store(&self, out_dir: &Path) -> ResultStore {
        ResultStore::new(out_dir.join(&self.results_file)).with_provenance(&self.id, self.fingerprint())
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|metric| metric.name.clone()).collect()
    }

    fn extractor(&self) -> Result<Extractor, DefinitionError> {
        if self.id.trim().is_empty() {
            return Err(DefinitionError::EmptyId);
        }
        self.space.validate()?;
        let declared: HashSet<&str> = self
            .space
            .declarations()
            .iter()
            .map(|declaration| declaration.name())
            .collect();
        if let Some(trials) = &self.trials {
            trials.validate()?;
            if let SeedInjection::Define { name } = &trials.injection {
                if declared.contains(name.as_str()) {
                    return Err(SpaceError::DuplicateName(name.clone()).into());
                }
            }
        }
        if self.metrics.is_empty() {
            return Err(DefinitionError::NoMetrics(self.id.clone()));
        }

        let parameters = self.space.recorded_names();
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(self.metrics.len());
        for metric in &self.metrics {
            if !seen.insert(metric.name.as_str()) {
                return Err(DefinitionError::DuplicateMetric(metric.name.clone()));
            }
            if declared.contains(metric.name.as_str()) {
                return Err(DefinitionError::MetricShadowsParameter(metric.name.clone()));
            }
            fields.push(metric.pattern()?);
        }

        for chart in &self.charts {
            let unknown = chart.columns().find(|column| {
                !parameters.iter().any(|name| name == column) && !seen.contains(column)
            });
            if let Some(column) = unknown {
                return Err(DefinitionError::UnknownChartColumn {
                    chart: chart.file.clone(),
                    column: column.to_string(),
                });
            }
        }

        Ok(Extractor::new(fields))
    }
}
