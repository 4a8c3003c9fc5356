//! The sweep driver.
//!
//! Walks every configuration of an experiment's parameter space, builds and runs
//! the simulator for each trial, extracts and aggregates metrics, and folds the
//! rows into a [`ResultTable`]. Configurations run sequentially by default or on
//! a bounded rayon pool; either way rows come out in enumeration order.

use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregate::{aggregate, AggregateError, Reduction};
use crate::builder::{Artifact, BuildError, Builder};
use crate::extract::Extractor;
use crate::parameters::{
    Configuration, Declaration, Injection, ParameterSpace, SeedInjection, SpaceError, TrialPlan,
};
use crate::runner::{RunError, Runner};
use crate::table::{AggregatedRow, ResultTable, TableError};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

/// When the simulator is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPolicy {
    /// Rebuild for every configuration.
    #[default]
    PerConfiguration,
    /// Build once before the sweep; only fixed settings may be definitions.
    Once,
}

/// Everything needed to sweep one experiment.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub id: String,
    pub space: ParameterSpace,
    pub trials: Option<TrialPlan>,
    pub extractor: Extractor,
    pub reduction: Reduction,
    pub build_policy: BuildPolicy,
    /// Where the builder writes the executable.
    pub artifact: PathBuf,
}

impl Experiment {
    pub fn new(id: impl Into<String>, space: ParameterSpace, extractor: Extractor) -> Self {
        Self {
            id: id.into(),
            space,
            trials: None,
            extractor,
            reduction: Reduction::default(),
            build_policy: BuildPolicy::default(),
            artifact: PathBuf::from("run"),
        }
    }

    pub fn trials(mut self, trials: TrialPlan) -> Self {
        self.trials = Some(trials);
        self
    }

    pub fn reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn build_policy(mut self, policy: BuildPolicy) -> Self {
        self.build_policy = policy;
        self
    }

    pub fn artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact = path.into();
        self
    }

    /// An empty table with this experiment's column layout.
    pub fn empty_table(&self) -> ResultTable {
        ResultTable::new(self.space.recorded_names(), self.extractor.metric_names())
    }

    fn seeds(&self) -> Vec<Option<u64>> {
        match &self.trials {
            Some(plan) => plan.seeds.iter().copied().map(Some).collect(),
            None => vec![None],
        }
    }

    fn seed_injection(&self) -> Option<&SeedInjection> {
        self.trials.as_ref().map(|plan| &plan.injection)
    }
}

/// What happens to the sweep when a configuration fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failed configuration, keeping earlier rows.
    #[default]
    Abort,
    /// Record the failure and continue with the next configuration.
    Skip,
}

/// What happens when a trial's output lacks a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Keep the absent value and log a warning.
    #[default]
    Record,
    /// Treat the configuration as failed.
    FailConfiguration,
}

/// Shared flag checked between configurations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    pub failure_policy: FailurePolicy,
    pub gap_policy: GapPolicy,
    /// More than one worker runs configurations on a rayon pool.
    pub workers: Option<usize>,
    pub progress: bool,
    pub cancel: CancelToken,
}

/// Why a single configuration produced no row.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("build failed: {0}")]
    Build(#[from] BuildError),
    #[error("run failed{}: {source}", seed_label(.seed))]
    Run {
        seed: Option<u64>,
        #[source]
        source: RunError,
    },
    #[error("output{} lacks metrics: {}", seed_label(.seed), .metrics.join(", "))]
    Gaps { seed: Option<u64>, metrics: Vec<String> },
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Row(#[from] TableError),
}

fn seed_label(seed: &Option<u64>) -> String {
    match seed {
        Some(seed) => format!(" (seed {seed})"),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error("shared build failed: {0}")]
    Build(#[source] BuildError),
    #[error("build policy 'once' cannot inject per-configuration definition '{0}'")]
    OnceWithVaryingDefinition(String),
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug)]
pub struct ConfigurationFailure {
    pub index: usize,
    pub configuration: Configuration,
    pub error: TrialError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A configuration failed under [`FailurePolicy::Abort`].
    Aborted { index: usize },
    /// Cancelled before configuration `index` started.
    Cancelled { index: usize },
}

#[derive(Debug)]
pub struct SweepReport {
    pub table: ResultTable,
    pub failures: Vec<ConfigurationFailure>,
    pub stop: Option<StopReason>,
    /// Configurations in the space.
    pub total: usize,
}

impl SweepReport {
    pub fn is_complete(&self) -> bool {
        self.stop.is_none() && self.failures.is_empty()
    }
}

/// Outcome of one configuration as seen by the fold.
enum Outcome {
    Done(Result<AggregatedRow, TrialError>),
    Skipped,
}

struct FoldState {
    table: ResultTable,
    failures: Vec<ConfigurationFailure>,
}

pub struct Sweep<B, R> {
    experiment: Experiment,
    builder: B,
    runner: R,
    options: SweepOptions,
}

impl<B: Builder, R: Runner> Sweep<B, R> {
    pub fn new(experiment: Experiment, builder: B, runner: R) -> Self {
        Self {
            experiment,
            builder,
            runner,
            options: SweepOptions::default(),
        }
    }

    pub fn options(mut self, options: SweepOptions) -> Self {
        self.options = options;
        self
    }

    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    pub fn run(&self) -> Result<SweepReport, SweepError> {
        let configurations = self.experiment.space.generate()?;
        if let Some(plan) = &self.experiment.trials {
            plan.validate()?;
            if let SeedInjection::Define { name } = &plan.injection {
                let clashes = self
                    .experiment
                    .space
                    .declarations()
                    .iter()
                    .any(|declaration| declaration.name() == name);
                if clashes {
                    return Err(SpaceError::DuplicateName(name.clone()).into());
                }
            }
        }
        let total = configurations.total();
        let shared = self.shared_artifact()?;

        info!(
            experiment = %self.experiment.id,
            configurations = total,
            trials = self.experiment.seeds().len(),
            "starting sweep"
        );

        let progress = self.progress_bar(total);
        let state = FoldState {
            table: self.experiment.empty_table(),
            failures: Vec::new(),
        };

        let (state, stop) = match self.options.workers.filter(|workers| *workers > 1) {
            None => {
                let cancel = &self.options.cancel;
                let outcomes = configurations.enumerate().map(|(index, configuration)| {
                    if cancel.is_cancelled() {
                        return (index, configuration, Outcome::Skipped);
                    }
                    let outcome =
                        self.execute(index, &configuration, shared.as_ref(), &self.experiment.artifact);
                    if let Some(bar) = &progress {
                        bar.inc(1);
                    }
                    (index, configuration, Outcome::Done(outcome))
                });
                self.fold(state, outcomes)
            }
            Some(workers) => {
                let configurations: Vec<Configuration> = configurations.collect();
                let outcomes = self.execute_parallel(&configurations, workers, shared.as_ref(), progress.as_ref())?;
                self.fold(
                    state,
                    configurations
                        .into_iter()
                        .zip(outcomes)
                        .enumerate()
                        .map(|(index, (configuration, outcome))| (index, configuration, outcome)),
                )
            }
        };

        if let Some(bar) = &progress {
            bar.finish_with_message("Completed");
        }

        info!(
            experiment = %self.experiment.id,
            rows = state.table.len(),
            failures = state.failures.len(),
            stopped = stop.is_some(),
            "sweep finished"
        );

        Ok(SweepReport {
            table: state.table,
            failures: state.failures,
            stop,
            total,
        })
    }

    fn execute_parallel(
        &self,
        configurations: &[Configuration],
        workers: usize,
        shared: Option<&Artifact>,
        progress: Option<&ProgressBar>,
    ) -> Result<Vec<Outcome>, SweepError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        let abort = self.options.failure_policy == FailurePolicy::Abort;
        let first_failure = AtomicUsize::new(usize::MAX);

        let outcomes = pool.install(|| {
            configurations
                .par_iter()
                .enumerate()
                .map(|(index, configuration)| {
                    if self.options.cancel.is_cancelled()
                        || index > first_failure.load(Ordering::SeqCst)
                    {
                        return Outcome::Skipped;
                    }
                    let artifact = indexed_path(&self.experiment.artifact, index);
                    let outcome = self.execute(index, configuration, shared, &artifact);
                    if shared.is_none() {
                        let _ = fs::remove_file(&artifact);
                    }
                    if abort && outcome.is_err() {
                        first_failure.fetch_min(index, Ordering::SeqCst);
                    }
                    if let Some(bar) = progress {
                        bar.inc(1);
                    }
                    Outcome::Done(outcome)
                })
                .collect()
        });
        Ok(outcomes)
    }

    /// Fold outcomes in enumeration order into the table, stopping on abort or
    /// at the first configuration that never ran.
    fn fold(
        &self,
        state: FoldState,
        mut outcomes: impl Iterator<Item = (usize, Configuration, Outcome)>,
    ) -> (FoldState, Option<StopReason>) {
        let flow = outcomes.try_fold(state, |mut state, (index, configuration, outcome)| {
            let result = match outcome {
                Outcome::Skipped => {
                    warn!(index, "sweep cancelled");
                    return ControlFlow::Break((state, StopReason::Cancelled { index }));
                }
                Outcome::Done(result) => result,
            };

            let error = match result.and_then(|row| state.table.push(row).map_err(TrialError::from)) {
                Ok(()) => return ControlFlow::Continue(state),
                Err(error) => error,
            };

            warn!(index, configuration = %configuration, error = %error, "configuration failed");
            state.failures.push(ConfigurationFailure {
                index,
                configuration,
                error,
            });
            match self.options.failure_policy {
                FailurePolicy::Abort => ControlFlow::Break((state, StopReason::Aborted { index })),
                FailurePolicy::Skip => ControlFlow::Continue(state),
            }
        });

        match flow {
            ControlFlow::Continue(state) => (state, None),
            ControlFlow::Break((state, reason)) => (state, Some(reason)),
        }
    }

    /// Build, run every trial, extract and aggregate one configuration.
    fn execute(
        &self,
        index: usize,
        configuration: &Configuration,
        shared: Option<&Artifact>,
        artifact_path: &Path,
    ) -> Result<AggregatedRow, TrialError> {
        let definitions = configuration.definitions();
        let seed_define = match self.experiment.seed_injection() {
            Some(SeedInjection::Define { name }) => Some(name.as_str()),
            _ => None,
        };

        let built = match (shared, seed_define) {
            (Some(artifact), _) => Some(artifact.clone()),
            (None, None) => Some(self.builder.build(&definitions, artifact_path)?),
            (None, Some(_)) => None,
        };

        let mut records = Vec::new();
        for seed in self.experiment.seeds() {
            let seeded;
            let artifact = match (&built, seed_define, seed) {
                (Some(artifact), _, _) => artifact,
                (None, Some(name), Some(seed)) => {
                    let mut definitions = definitions.clone();
                    definitions.push((name.to_string(), seed.to_string()));
                    seeded = self.builder.build(&definitions, artifact_path)?;
                    &seeded
                }
                (None, _, _) => {
                    seeded = self.builder.build(&definitions, artifact_path)?;
                    &seeded
                }
            };

            let mut args = configuration.run_args();
            if let (Some(SeedInjection::Arg), Some(seed)) = (self.experiment.seed_injection(), seed) {
                args.push(seed.to_string());
            }

            let output = self
                .runner
                .run(artifact, &args)
                .map_err(|source| TrialError::Run { seed, source })?;
            let record = self.experiment.extractor.extract(output);

            let gaps: Vec<String> = record.gaps().into_iter().map(str::to_string).collect();
            if !gaps.is_empty() {
                match self.options.gap_policy {
                    GapPolicy::Record => {
                        warn!(
                            index,
                            configuration = %configuration,
                            seed = ?seed,
                            metrics = ?gaps,
                            "metrics missing from simulator output"
                        );
                    }
                    GapPolicy::FailConfiguration => {
                        return Err(TrialError::Gaps { seed, metrics: gaps });
                    }
                }
            }
            records.push(record);
        }

        let combined = aggregate(&records, self.experiment.reduction)?;
        info!(index, configuration = %configuration, "configuration complete");
        Ok(AggregatedRow::from_record(
            configuration.recorded_values(),
            &self.experiment.extractor.metric_names(),
            &combined,
        ))
    }

    /// Build up front under [`BuildPolicy::Once`].
    fn shared_artifact(&self) -> Result<Option<Artifact>, SweepError> {
        if self.experiment.build_policy != BuildPolicy::Once {
            return Ok(None);
        }

        let mut definitions = Vec::new();
        for declaration in self.experiment.space.declarations() {
            if declaration.injection() != Injection::Define {
                continue;
            }
            match declaration {
                Declaration::Fixed { name, value, .. } => {
                    definitions.push((name.clone(), value.to_string()))
                }
                other => {
                    return Err(SweepError::OnceWithVaryingDefinition(other.name().to_string()))
                }
            }
        }
        if let Some(SeedInjection::Define { name }) = self.experiment.seed_injection() {
            return Err(SweepError::OnceWithVaryingDefinition(name.clone()));
        }

        info!(artifact = %self.experiment.artifact.display(), "building simulator once");
        self.builder
            .build(&definitions, &self.experiment.artifact)
            .map(Some)
            .map_err(SweepError::Build)
    }

    fn progress_bar(&self, total: usize) -> Option<ProgressBar> {
        if !self.options.progress || total == 0 {
            return None;
        }
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Some(bar)
    }
}

/// `<artifact>-<index>`, so concurrent builds never share an output path.
fn indexed_path(artifact: &Path, index: usize) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(format!("-{index}"));
    PathBuf::from(name)
}
