//! End-to-end entry point: sweep, persist, plot; or load persisted results and
//! plot them.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::builder::Builder;
use crate::definition::{DefinitionError, ExperimentDefinition};
use crate::export::StoreError;
use crate::parameters::Configuration;
use crate::plot::{self, PlotError};
use crate::runner::Runner;
use crate::sweep::{ConfigurationFailure, StopReason, Sweep, SweepError, SweepOptions, TrialError};
use crate::table::ResultTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Build, run, persist and plot.
    #[default]
    Execute,
    /// Plot previously persisted results without running anything.
    LoadOnly,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Plot(#[from] PlotError),
    #[error(
        "sweep aborted at configuration {index} ({configuration}): {source}; partial results saved to {}",
        .results.display()
    )]
    Aborted {
        index: usize,
        configuration: Configuration,
        #[source]
        source: TrialError,
        results: PathBuf,
    },
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub table: ResultTable,
    pub results: PathBuf,
    pub charts: Vec<PathBuf>,
    /// Configurations skipped under the skip policy. Always empty when loading.
    pub failures: Vec<ConfigurationFailure>,
    pub stop: Option<StopReason>,
    /// Loaded results were produced by a different definition.
    pub stale: bool,
}

pub struct Pipeline {
    definition: ExperimentDefinition,
    out_dir: PathBuf,
    options: SweepOptions,
}

impl Pipeline {
    pub fn new(definition: ExperimentDefinition) -> Self {
        Self {
            definition,
            out_dir: PathBuf::from("."),
            options: SweepOptions::default(),
        }
    }

    /// Directory for the result file and charts.
    pub fn out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    pub fn options(mut self, options: SweepOptions) -> Self {
        self.options = options;
        self
    }

    pub fn definition(&self) -> &ExperimentDefinition {
        &self.definition
    }

    /// Run with the compiler and process runner the definition describes.
    pub fn run(&self, mode: Mode) -> Result<PipelineOutcome, PipelineError> {
        self.run_with(mode, self.definition.builder(), self.definition.runner())
    }

    pub fn run_with<B: Builder, R: Runner>(
        &self,
        mode: Mode,
        builder: B,
        runner: R,
    ) -> Result<PipelineOutcome, PipelineError> {
        match mode {
            Mode::Execute => self.execute(builder, runner),
            Mode::LoadOnly => self.load_only(),
        }
    }

    fn execute<B: Builder, R: Runner>(&self, builder: B, runner: R) -> Result<PipelineOutcome, PipelineError> {
        let experiment = self.definition.compile()?;
        let store = self.definition.store(&self.out_dir);

        let report = Sweep::new(experiment, builder, runner)
            .options(self.options.clone())
            .run()?;

        store.save_with_failures(&report.table, report.failures.len())?;
        info!(
            results = %store.path().display(),
            rows = report.table.len(),
            "saved results"
        );

        let mut failures = report.failures;
        if let Some(StopReason::Aborted { index }) = report.stop {
            if let Some(position) = failures.iter().position(|failure| failure.index == index) {
                let failure = failures.swap_remove(position);
                return Err(PipelineError::Aborted {
                    index,
                    configuration: failure.configuration,
                    source: failure.error,
                    results: store.path().to_path_buf(),
                });
            }
        }

        let charts = self.render(&report.table)?;
        Ok(PipelineOutcome {
            table: report.table,
            results: store.path().to_path_buf(),
            charts,
            failures,
            stop: report.stop,
            stale: false,
        })
    }

    fn load_only(&self) -> Result<PipelineOutcome, PipelineError> {
        self.definition.validate()?;
        let store = self.definition.store(&self.out_dir);

        let table = store.load_expecting(&self.definition.space.recorded_names(), &self.definition.metric_names())?;
        let stale = match store.read_manifest()? {
            Some(manifest) => {
                let current = self.definition.fingerprint();
                let stale = manifest.fingerprint.as_deref() != Some(current.as_str());
                if stale {
                    warn!(
                        results = %store.path().display(),
                        "stored results were produced by a different definition; rerun the sweep to refresh them"
                    );
                }
                stale
            }
            None => false,
        };
        info!(results = %store.path().display(), rows = table.len(), "loaded results");

        let charts = self.render(&table)?;
        Ok(PipelineOutcome {
            table,
            results: store.path().to_path_buf(),
            charts,
            failures: Vec::new(),
            stop: None,
            stale,
        })
    }

    fn render(&self, table: &ResultTable) -> Result<Vec<PathBuf>, PlotError> {
        let charts = plot::render(table, &self.definition.charts, &self.out_dir)?;
        for chart in &charts {
            info!(chart = %chart.display(), "wrote chart");
        }
        Ok(charts)
    }

    pub fn results_path(&self) -> PathBuf {
        self.definition.store(&self.out_dir).path().to_path_buf()
    }
}
