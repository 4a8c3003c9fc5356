//! Executes a built simulator and captures its output.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::builder::{exit_label, Artifact};

/// Default upper bound for a single simulator run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long output pipes may stay open after the child has been reaped, e.g.
/// when a leftover descendant still holds them.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Text captured from one execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawOutput {
    pub stdout: String,
    /// Kept for diagnostics only; extraction never reads it.
    pub stderr: String,
    pub elapsed: Duration,
}

impl RawOutput {
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {}: {stderr}", exit_label(.status))]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("lost track of `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs an artifact with positional arguments.
pub trait Runner: Sync {
    fn run(&self, artifact: &Artifact, args: &[String]) -> Result<RawOutput, RunError>;
}

impl<T: Runner + ?Sized> Runner for &T {
    fn run(&self, artifact: &Artifact, args: &[String]) -> Result<RawOutput, RunError> {
        (**self).run(artifact, args)
    }
}

/// Child-process runner with a bounded wait.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    working_dir: Option<PathBuf>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_RUN_TIMEOUT),
            working_dir: None,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` waits indefinitely.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    fn program_path(path: &Path) -> std::io::Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(std::env::current_dir()?.join(path))
        }
    }
}

impl Runner for ProcessRunner {
    fn run(&self, artifact: &Artifact, args: &[String]) -> Result<RawOutput, RunError> {
        let program_label = artifact.path().display().to_string();
        let program = Self::program_path(artifact.path()).map_err(|source| RunError::Launch {
            program: program_label.clone(),
            source,
        })?;
        debug!(program = %program.display(), args = ?args, "running simulator");

        let mut command = Command::new(&program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| RunError::Launch {
            program: program_label.clone(),
            source,
        })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_with_deadline(&mut child, self.timeout).map_err(|source| {
            RunError::Wait {
                program: program_label.clone(),
                source,
            }
        })?;
        let drained_by = Instant::now() + DRAIN_GRACE;
        let stdout = collect(stdout, drained_by);
        let stderr = collect(stderr, drained_by);

        let Some(status) = status else {
            return Err(RunError::Timeout {
                program: program_label,
                timeout: self.timeout.unwrap_or_default(),
            });
        };

        if !status.success() {
            return Err(RunError::Failed {
                program: program_label,
                status: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(RawOutput {
            stdout,
            stderr,
            elapsed: started.elapsed(),
        })
    }
}

/// Poll the child until it exits or the deadline passes. On timeout the child
/// is killed and reaped, and `None` is returned.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None if Instant::now() >= deadline => {
                // The child may exit between the poll and the kill.
                let _ = child.kill();
                child.wait()?;
                return Ok(None);
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}

fn drain<R>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut reader| {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            let _ = sender.send(buffer);
        });
        receiver
    })
}

/// Everything read from a pipe, or nothing if it is still open at `deadline`.
/// The reader thread is left to finish on its own.
fn collect(receiver: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    receiver
        .and_then(|receiver| {
            receiver
                .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                .ok()
        })
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell() -> Artifact {
        Artifact::new("/bin/sh", Vec::new())
    }

    fn script(body: &str) -> Vec<String> {
        vec!["-c".to_string(), body.to_string()]
    }

    #[test]
    fn test_captures_stdout_and_stderr() {
        let runner = ProcessRunner::new();
        let output = runner
            .run(
                &shell(),
                &script("echo 'Rejected arrival count = 12.000'; echo diag >&2"),
            )
            .unwrap();
        assert_eq!(output.stdout, "Rejected arrival count = 12.000\n");
        assert_eq!(output.stderr, "diag\n");
    }

    #[test]
    fn test_positional_arguments_are_passed_verbatim() {
        let runner = ProcessRunner::new();
        let mut args = script("echo \"$1,$2\"");
        args.push("sh".to_string());
        args.push("10".to_string());
        args.push("90.0; echo injected".to_string());
        let output = runner.run(&shell(), &args).unwrap();
        assert_eq!(output.stdout, "10,90.0; echo injected\n");
    }

    #[test]
    fn test_non_zero_exit_is_a_run_error() {
        let runner = ProcessRunner::new();
        let error = runner
            .run(&shell(), &script("echo broken >&2; exit 3"))
            .unwrap_err();
        match error {
            RunError::Failed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timeout_kills_the_child() {
        let runner = ProcessRunner::new().timeout(Some(Duration::from_millis(100)));
        let started = Instant::now();
        let error = runner.run(&shell(), &script("exec sleep 5")).unwrap_err();
        assert!(matches!(error, RunError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_does_not_wait_for_descendants_holding_output() {
        let runner = ProcessRunner::new().timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let error = runner.run(&shell(), &script("sleep 5; echo late")).unwrap_err();
        assert!(matches!(error, RunError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_background_descendant_does_not_block_a_finished_run() {
        let runner = ProcessRunner::new();
        let started = Instant::now();
        let output = runner
            .run(&shell(), &script("sleep 5 & echo 'Transmitted arrival count = 3'"))
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(output.stdout.is_empty() || output.stdout.contains("Transmitted"));
    }

    #[test]
    fn test_missing_artifact_fails_to_launch() {
        let runner = ProcessRunner::new();
        let artifact = Artifact::new("/nonexistent/simulator", Vec::new());
        let error = runner.run(&artifact, &[]).unwrap_err();
        assert!(matches!(error, RunError::Launch { .. }));
    }
}
