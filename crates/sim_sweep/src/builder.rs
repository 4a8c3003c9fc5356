//! Builds the simulator executable for one configuration.
//!
//! The compiler is invoked with an explicit argument list: flags, one
//! `-DNAME=VALUE` per build-time setting, the selected sources, `-o <artifact>`
//! and the link libraries. No shell is involved.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Handle to a built simulator executable.
///
/// Carries the definitions it was compiled with so a run can be traced back to
/// its build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    definitions: Vec<(String, String)>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, definitions: Vec<(String, String)>) -> Self {
        Self {
            path: path.into(),
            definitions,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn definitions(&self) -> &[(String, String)] {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Option<&str> {
        self.definitions
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no source files matched {selector}")]
    NoSources { selector: String },
    #[error("failed to list sources in {dir}: {source}")]
    Sources {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch compiler `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("compiler exited with {}: {stderr}", exit_label(.status))]
    Failed { status: Option<i32>, stderr: String },
}

pub(crate) fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Produces a runnable artifact from build-time definitions.
pub trait Builder: Sync {
    /// Build into `output`, replacing whatever is there.
    fn build(&self, definitions: &[(String, String)], output: &Path) -> Result<Artifact, BuildError>;
}

impl<T: Builder + ?Sized> Builder for &T {
    fn build(&self, definitions: &[(String, String)], output: &Path) -> Result<Artifact, BuildError> {
        (**self).build(definitions, output)
    }
}

/// Which source files are compiled together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "select", rename_all = "snake_case")]
pub enum SourceSelector {
    /// File names in `dir` matching a `*`/`?` wildcard pattern, sorted.
    Pattern { dir: PathBuf, pattern: String },
    /// Explicit list, in the given order.
    Files { files: Vec<PathBuf> },
}

impl SourceSelector {
    pub fn pattern(dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        SourceSelector::Pattern {
            dir: dir.into(),
            pattern: pattern.into(),
        }
    }

    pub fn files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        SourceSelector::Files {
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    pub fn resolve(&self) -> Result<Vec<PathBuf>, BuildError> {
        let sources = match self {
            SourceSelector::Pattern { dir, pattern } => {
                let entries = fs::read_dir(dir).map_err(|source| BuildError::Sources {
                    dir: dir.clone(),
                    source,
                })?;
                let mut matched = Vec::new();
                for entry in entries {
                    let entry = entry.map_err(|source| BuildError::Sources {
                        dir: dir.clone(),
                        source,
                    })?;
                    let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                    let name = entry.file_name();
                    if is_file && wildcard_match(pattern, &name.to_string_lossy()) {
                        matched.push(dir.join(name));
                    }
                }
                matched.sort();
                matched
            }
            SourceSelector::Files { files } => files.clone(),
        };

        if sources.is_empty() {
            return Err(BuildError::NoSources {
                selector: self.to_string(),
            });
        }
        Ok(sources)
    }
}

impl std::fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSelector::Pattern { dir, pattern } => {
                write!(f, "{}", dir.join(pattern).display())
            }
            SourceSelector::Files { files } => {
                let names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
                write!(f, "[{}]", names.join(", "))
            }
        }
    }
}

/// Shell-style wildcard match supporting `*` and `?`.
pub(crate) fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            n = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

/// External C compiler invocation (`gcc -O2 -Wall -D... *.c -o run -lm`).
#[derive(Debug, Clone)]
pub struct CompilerBuilder {
    pub compiler: String,
    pub flags: Vec<String>,
    pub sources: SourceSelector,
    pub libraries: Vec<String>,
}

impl CompilerBuilder {
    pub fn new(sources: SourceSelector) -> Self {
        Self {
            compiler: "gcc".to_string(),
            flags: vec!["-O2".to_string(), "-Wall".to_string()],
            sources,
            libraries: vec!["-lm".to_string()],
        }
    }

    pub fn compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = compiler.into();
        self
    }

    pub fn flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    pub fn libraries(mut self, libraries: Vec<String>) -> Self {
        self.libraries = libraries;
        self
    }

    /// Full argument list, excluding the compiler itself.
    pub fn arguments(
        &self,
        definitions: &[(String, String)],
        sources: &[PathBuf],
        output: &Path,
    ) -> Vec<String> {
        let mut args = self.flags.clone();
        args.extend(
            definitions
                .iter()
                .map(|(name, value)| format!("-D{name}={value}")),
        );
        args.extend(sources.iter().map(|path| path.display().to_string()));
        args.push("-o".to_string());
        args.push(output.display().to_string());
        args.extend(self.libraries.iter().cloned());
        args
    }
}

impl Builder for CompilerBuilder {
    fn build(&self, definitions: &[(String, String)], output: &Path) -> Result<Artifact, BuildError> {
        let sources = self.sources.resolve()?;
        let args = self.arguments(definitions, &sources, output);
        debug!(compiler = %self.compiler, args = ?args, "compiling simulator");

        let result = Command::new(&self.compiler)
            .args(&args)
            .output()
            .map_err(|source| BuildError::Launch {
                program: self.compiler.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(BuildError::Failed {
                status: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(Artifact::new(output, definitions.to_vec()))
    }
}
