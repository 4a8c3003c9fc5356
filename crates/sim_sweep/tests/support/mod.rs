//! In-process stand-ins for the compiler and the simulator.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sim_sweep::{
    Artifact, BuildDefinition, BuildError, Builder, ExperimentDefinition, MetricDefinition, ParameterSpace,
    RawOutput, Reduction, RunDefinition, RunError, Runner, SourceSelector,
};

/// Records every build and optionally fails one definition value.
#[derive(Default)]
pub struct StubBuilder {
    builds: Mutex<Vec<(Vec<(String, String)>, PathBuf)>>,
    fail_on: Option<(String, String)>,
}

impl StubBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(name: &str, value: &str) -> Self {
        Self {
            fail_on: Some((name.to_string(), value.to_string())),
            ..Self::default()
        }
    }

    pub fn builds(&self) -> Vec<(Vec<(String, String)>, PathBuf)> {
        self.builds.lock().expect("build log lock").clone()
    }

    pub fn count(&self) -> usize {
        self.builds.lock().expect("build log lock").len()
    }
}

impl Builder for StubBuilder {
    fn build(&self, definitions: &[(String, String)], output: &Path) -> Result<Artifact, BuildError> {
        self.builds
            .lock()
            .expect("build log lock")
            .push((definitions.to_vec(), output.to_path_buf()));
        if let Some(failing) = &self.fail_on {
            if definitions.contains(failing) {
                return Err(BuildError::Failed {
                    status: Some(1),
                    stderr: format!("error: cannot build with {}={}", failing.0, failing.1),
                });
            }
        }
        Ok(Artifact::new(output, definitions.to_vec()))
    }
}

/// Simulator double driven by a closure over the artifact and run arguments.
pub struct ScriptedRunner<F> {
    script: F,
    calls: Mutex<Vec<Vec<String>>>,
}

impl<F> ScriptedRunner<F>
where
    F: Fn(&Artifact, &[String]) -> Result<String, String> + Sync,
{
    pub fn new(script: F) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("call log lock").clone()
    }
}

impl<F> Runner for ScriptedRunner<F>
where
    F: Fn(&Artifact, &[String]) -> Result<String, String> + Sync,
{
    fn run(&self, artifact: &Artifact, args: &[String]) -> Result<RawOutput, RunError> {
        self.calls.lock().expect("call log lock").push(args.to_vec());
        match (self.script)(artifact, args) {
            Ok(stdout) => Ok(RawOutput::from_stdout(stdout)),
            Err(stderr) => Err(RunError::Failed {
                program: artifact.path().display().to_string(),
                status: Some(2),
                stderr,
            }),
        }
    }
}

/// Integer value of a build-time definition.
pub fn defined(artifact: &Artifact, name: &str) -> i64 {
    artifact
        .definition(name)
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(|| panic!("artifact was built without {name}"))
}

/// Packet-queue style output for buffer size `b`: rejected `10*b`, transmitted `5*b`.
pub fn packet_output(b: i64) -> String {
    format!(
        "Simulation finished.\nRejected arrival count = {}.000\nTransmitted arrival count = {}.000\n",
        10 * b,
        5 * b
    )
}

/// Definition sweeping `B` with the packet-queue labels.
pub fn packet_definition(space: ParameterSpace) -> ExperimentDefinition {
    ExperimentDefinition {
        id: "buffer-size".to_string(),
        description: String::new(),
        build: BuildDefinition::new(SourceSelector::files(["main.c"])),
        run: RunDefinition::default(),
        space,
        trials: None,
        metrics: vec![
            MetricDefinition::label("Rejected", "Rejected arrival count"),
            MetricDefinition::label("Transmitted", "Transmitted arrival count"),
        ],
        reduction: Reduction::Mean,
        charts: Vec::new(),
        results_file: PathBuf::from("q1a.csv"),
    }
}
