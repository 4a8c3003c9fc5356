use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};
use sim_sweep::{
    export_json, presets, ExperimentDefinition, FailurePolicy, GapPolicy, Mode, Pipeline, PipelineOutcome,
    StopReason, SweepOptions,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sim-sweep",
    about = "Parameter sweeps over a compiled network simulator",
    long_about = "Builds the simulator for each parameter configuration, runs it once per seed,\n\
                  extracts metrics from its output, and saves and plots the aggregated results."
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment, or re-plot its saved results
    Run {
        /// Experiment definition (JSON)
        #[arg(required_unless_present = "preset", conflicts_with = "preset")]
        definition: Option<PathBuf>,
        /// Built-in experiment id (see `list`)
        #[arg(long)]
        preset: Option<String>,
        /// Plot previously saved results without building or running anything
        #[arg(long)]
        load_only: bool,
        /// Directory for results and charts
        #[arg(long, env = "SIM_SWEEP_OUT_DIR", default_value = ".")]
        out_dir: PathBuf,
        /// Configurations to run concurrently
        #[arg(long)]
        workers: Option<usize>,
        /// Keep going after a configuration fails
        #[arg(long)]
        skip_failures: bool,
        /// Fail a configuration whose output lacks a metric
        #[arg(long)]
        strict_gaps: bool,
        /// Per-run timeout, overriding the definition
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Also write the result table as JSON
        #[arg(long)]
        json: Option<PathBuf>,
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// List built-in experiments
    List,
    /// Print a built-in experiment as a JSON definition
    Show {
        /// Experiment id
        id: String,
    },
    /// Check a definition file without running it
    Validate {
        /// Experiment definition (JSON)
        definition: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    if let Err(message) = dispatch(cli.command) {
        error!("{message}");
        exit(1);
    }
}

fn dispatch(command: Commands) -> Result<(), String> {
    match command {
        Commands::Run {
            definition,
            preset,
            load_only,
            out_dir,
            workers,
            skip_failures,
            strict_gaps,
            timeout_secs,
            json,
            no_progress,
        } => {
            let mut definition = resolve(definition, preset)?;
            if timeout_secs.is_some() {
                definition.run.timeout_secs = timeout_secs;
            }
            let options = SweepOptions {
                failure_policy: if skip_failures {
                    FailurePolicy::Skip
                } else {
                    FailurePolicy::Abort
                },
                gap_policy: if strict_gaps {
                    GapPolicy::FailConfiguration
                } else {
                    GapPolicy::Record
                },
                workers,
                progress: !no_progress,
                ..SweepOptions::default()
            };
            let mode = if load_only { Mode::LoadOnly } else { Mode::Execute };

            let outcome = Pipeline::new(definition)
                .out_dir(out_dir)
                .options(options)
                .run(mode)
                .map_err(|error| error.to_string())?;
            if let Some(path) = json {
                export_json(&outcome.table, &path).map_err(|error| error.to_string())?;
                info!(path = %path.display(), "wrote JSON results");
            }
            summarize(&outcome);
            Ok(())
        }
        Commands::List => {
            for definition in presets::all() {
                println!("{:<20} {}", definition.id, definition.description);
            }
            Ok(())
        }
        Commands::Show { id } => {
            let definition = presets::find(&id).ok_or_else(|| unknown_preset(&id))?;
            println!("{}", definition.to_json_pretty());
            Ok(())
        }
        Commands::Validate { definition } => {
            let definition = ExperimentDefinition::from_path(&definition).map_err(|error| error.to_string())?;
            let experiment = definition.compile().map_err(|error| error.to_string())?;
            let total = experiment
                .space
                .generate()
                .map_err(|error| error.to_string())?
                .total();
            let trials = experiment.trials.as_ref().map_or(1, |plan| plan.len());
            println!(
                "{}: {total} configurations x {trials} trials, results in {}",
                definition.id,
                definition.results_file.display()
            );
            Ok(())
        }
    }
}

fn resolve(path: Option<PathBuf>, preset: Option<String>) -> Result<ExperimentDefinition, String> {
    match (path, preset) {
        (Some(path), _) => ExperimentDefinition::from_path(&path).map_err(|error| error.to_string()),
        (None, Some(id)) => presets::find(&id).ok_or_else(|| unknown_preset(&id)),
        (None, None) => Err("either a definition file or --preset is required".to_string()),
    }
}

fn unknown_preset(id: &str) -> String {
    let known: Vec<String> = presets::all().into_iter().map(|definition| definition.id).collect();
    format!("unknown preset '{id}'; known presets: {}", known.join(", "))
}

fn summarize(outcome: &PipelineOutcome) {
    println!("Results: {} ({} rows)", outcome.results.display(), outcome.table.len());
    for chart in &outcome.charts {
        println!("Chart:   {}", chart.display());
    }
    if outcome.stale {
        println!("Warning: results were produced by a different definition");
    }
    for failure in &outcome.failures {
        println!(
            "Skipped: configuration {} ({}): {}",
            failure.index, failure.configuration, failure.error
        );
    }
    if let Some(StopReason::Cancelled { index }) = outcome.stop {
        println!("Cancelled before configuration {index}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_accepts_preset_with_flags() {
        let cli = Cli::try_parse_from([
            "sim-sweep",
            "run",
            "--preset",
            "buffer-size",
            "--workers",
            "4",
            "--skip-failures",
        ])
        .expect("arguments should parse");
        match cli.command {
            Commands::Run {
                preset,
                workers,
                skip_failures,
                load_only,
                ..
            } => {
                assert_eq!(preset.as_deref(), Some("buffer-size"));
                assert_eq!(workers, Some(4));
                assert!(skip_failures);
                assert!(!load_only);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_requires_a_definition_or_preset() {
        assert!(Cli::try_parse_from(["sim-sweep", "run"]).is_err());
        assert!(Cli::try_parse_from(["sim-sweep", "run", "def.json", "--preset", "token-rate"]).is_err());
    }

    #[test]
    fn test_unknown_preset_lists_known_ids() {
        let message = resolve(None, Some("nope".to_string())).unwrap_err();
        assert!(message.contains("buffer-size"));
    }
}
