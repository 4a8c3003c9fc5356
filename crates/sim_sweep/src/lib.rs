//! Controlled experiment sweeps over an external network simulator.
//!
//! This crate varies build-time and run-time parameters of a C simulator, rebuilds
//! and runs it (optionally once per random seed), extracts scalar metrics from its
//! textual output, aggregates them across trials, persists the result table and
//! renders comparison charts.
//!
//! # Quick Start
//!
//! ```no_run
//! use sim_sweep::{presets, Mode, Pipeline, SweepOptions};
//!
//! // Sweep buffer size B over 1..=4, rebuilding the simulator for each value
//! let definition = presets::find("buffer-size").unwrap();
//!
//! let outcome = Pipeline::new(definition)
//!     .out_dir("results")
//!     .options(SweepOptions { progress: true, ..SweepOptions::default() })
//!     .run(Mode::Execute)
//!     .unwrap();
//!
//! println!("{} rows written to {}", outcome.table.len(), outcome.results.display());
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several modules, leaves first:
//!
//! - [`parameters`]: Parameter spaces, configurations and trial seeds
//! - [`builder`]: Compiling the simulator with `-DNAME=VALUE` definitions
//! - [`runner`]: Running the simulator with a timeout and capturing output
//! - [`extract`]: Pulling named numeric metrics out of the output
//! - [`aggregate`]: Reducing trial metrics to one value per configuration
//! - [`table`]: The in-memory result table
//! - [`export`]: CSV persistence with a JSON manifest, and JSON export
//! - [`plot`]: SVG line charts, optionally with a secondary axis
//! - [`sweep`]: The sweep driver (sequential or on a rayon pool)
//! - [`definition`]: JSON experiment definitions
//! - [`presets`]: Built-in experiment definitions
//! - [`pipeline`]: Execute or load-only entry point

pub mod aggregate;
pub mod builder;
pub mod definition;
pub mod export;
pub mod extract;
pub mod parameters;
pub mod pipeline;
pub mod plot;
pub mod presets;
pub mod runner;
pub mod sweep;
pub mod table;

pub use aggregate::{aggregate, AggregateError, Reduction};
pub use builder::{Artifact, BuildError, Builder, CompilerBuilder, SourceSelector};
pub use definition::{
    BuildDefinition, DefinitionError, ExperimentDefinition, MetricDefinition, MetricSource, RunDefinition,
};
pub use export::{export_json, ColumnKind, Manifest, ResultStore, StoreError};
pub use extract::{Extractor, FieldPattern, MetricRecord, PatternError};
pub use parameters::{
    Configuration, Configurations, Injection, ParamValue, ParameterSpace, SeedInjection, SpaceError, TrialPlan,
    Values,
};
pub use pipeline::{Mode, Pipeline, PipelineError, PipelineOutcome};
pub use plot::{render, ChartSpec, PlotError};
pub use runner::{ProcessRunner, RawOutput, RunError, Runner};
pub use sweep::{
    BuildPolicy, CancelToken, ConfigurationFailure, Experiment, FailurePolicy, GapPolicy, StopReason, Sweep,
    SweepError, SweepOptions, SweepReport, TrialError,
};
pub use table::{AggregatedRow, ResultTable, TableError};
