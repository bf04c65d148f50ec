//! Sandbox executor for generated artifacts.
//!
//! Each call materializes its files into a fresh scratch directory named after
//! the run, runs the configured command there with a scrubbed environment and
//! a hard timeout, and removes the directory afterwards. A failing or hanging
//! artifact is reported through [`SandboxOutcome`], not as an error.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::io::config::SandboxConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};

const FILE_PLACEHOLDER: &str = "{file}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Run the artifact itself.
    Execute,
    /// Run a test artifact, with the artifact it imports placed beside it.
    Test,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Execute => "execute",
            RunKind::Test => "test",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxOutcome {
    pub kind: RunKind,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl SandboxOutcome {
    fn from_output(kind: RunKind, output: &CommandOutput) -> Self {
        Self {
            kind,
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
            exit_code: output.exit_code,
            timed_out: output.timed_out,
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// Plain-text summary handed to the evaluator prompt.
    pub fn report(&self) -> String {
        let status = if self.timed_out {
            "timed out".to_string()
        } else {
            format!("exit code {}", self.exit_code)
        };
        format!(
            "{} run: {status}\n--- stdout ---\n{}\n--- stderr ---\n{}",
            self.kind,
            self.stdout.trim_end(),
            self.stderr.trim_end()
        )
    }
}

pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Run `source` as the given kind in its own scratch directory.
    pub async fn run(&self, run_id: &str, source: &str, kind: RunKind) -> Result<SandboxOutcome> {
        let file = self.file_name(kind);
        self.run_files(run_id, kind, &[(file, source)]).await
    }

    /// Run `tests` with `artifact` materialized beside it under the source file name.
    pub async fn run_tests(&self, run_id: &str, tests: &str, artifact: &str) -> Result<SandboxOutcome> {
        self.run_files(
            run_id,
            RunKind::Test,
            &[
                (self.config.test_file.as_str(), tests),
                (self.config.source_file.as_str(), artifact),
            ],
        )
        .await
    }

    fn file_name(&self, kind: RunKind) -> &str {
        match kind {
            RunKind::Execute => &self.config.source_file,
            RunKind::Test => &self.config.test_file,
        }
    }

    /// The first entry of `files` is the one the command runs.
    #[instrument(skip_all, fields(run_id = %run_id, kind = kind.as_str()))]
    async fn run_files(
        &self,
        run_id: &str,
        kind: RunKind,
        files: &[(&str, &str)],
    ) -> Result<SandboxOutcome> {
        let (entry, _) = files
            .first()
            .ok_or_else(|| anyhow!("sandbox run needs at least one file"))?;

        let scratch = self.scratch_dir(run_id, kind)?;
        for (name, contents) in files {
            let path = scratch.path().join(name);
            fs::write(&path, contents)
                .with_context(|| format!("write scratch file {}", path.display()))?;
        }
        debug!(dir = %scratch.path().display(), "materialized scratch files");

        let cmd = self.command(kind, entry, scratch.path())?;
        let output = run_command_with_timeout(
            cmd,
            self.config.timeout(),
            self.config.output_limit_bytes,
        )
        .await?;
        let outcome = SandboxOutcome::from_output(kind, &output);
        info!(
            exit_code = outcome.exit_code,
            timed_out = outcome.timed_out,
            "sandbox run finished"
        );
        // `scratch` is removed on drop, including when this future is cancelled.
        Ok(outcome)
    }

    fn scratch_dir(&self, run_id: &str, kind: RunKind) -> Result<tempfile::TempDir> {
        let prefix = format!("codeloop-{run_id}-{kind}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        match &self.config.scratch_root {
            Some(root) => {
                fs::create_dir_all(root)
                    .with_context(|| format!("create scratch root {}", root.display()))?;
                builder
                    .tempdir_in(root)
                    .with_context(|| format!("create scratch dir in {}", root.display()))
            }
            None => builder.tempdir().context("create scratch dir"),
        }
    }

    fn command(&self, kind: RunKind, file: &str, dir: &Path) -> Result<Command> {
        let template = match kind {
            RunKind::Execute => &self.config.execute_command,
            RunKind::Test => &self.config.test_command,
        };
        let args = expand_command(template, file);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| anyhow!("sandbox {kind} command is empty"))?;

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .current_dir(dir)
            .env_clear()
            .env("HOME", dir)
            .env("TMPDIR", dir)
            .env("PYTHONDONTWRITEBYTECODE", "1");
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        Ok(cmd)
    }
}

/// Substitute `{file}` in every argument, appending the file when no argument names it.
fn expand_command(template: &[String], file: &str) -> Vec<String> {
    let mut args: Vec<String> = template
        .iter()
        .map(|arg| arg.replace(FILE_PLACEHOLDER, file))
        .collect();
    if !template.iter().any(|arg| arg.contains(FILE_PLACEHOLDER)) {
        args.push(file.to_string());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_command_substitutes_or_appends() {
        let with_placeholder = vec!["python3".to_string(), "{file}".to_string()];
        assert_eq!(
            expand_command(&with_placeholder, "solution.py"),
            vec!["python3", "solution.py"]
        );
        let without = vec!["pytest".to_string(), "-q".to_string()];
        assert_eq!(
            expand_command(&without, "test_solution.py"),
            vec!["pytest", "-q", "test_solution.py"]
        );
    }

    #[test]
    fn report_mentions_status_and_streams() {
        let outcome = SandboxOutcome {
            kind: RunKind::Test,
            stdout: "1 failed\n".to_string(),
            stderr: String::new(),
            exit_code: 1,
            timed_out: false,
        };
        let report = outcome.report();
        assert!(report.starts_with("test run: exit code 1"));
        assert!(report.contains("1 failed"));
        assert!(!outcome.succeeded());
    }
}
