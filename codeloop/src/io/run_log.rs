//! Per-run JSON snapshots under `<run_log_dir>/<run_id>/`.
//!
//! Written only when `run_log_dir` is configured. Callers treat write errors as
//! warnings; a run never fails because its log could not be written.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{Step, WorkflowState};

#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
}

impl RunLog {
    pub fn new(root: &Path, run_id: &str) -> Self {
        Self {
            dir: root.join(run_id),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot for the `index`-th executed step (1-based).
    pub fn step_path(&self, index: u32, step: Step) -> PathBuf {
        self.dir.join(format!("{index:03}-{step}.json"))
    }

    pub fn final_path(&self) -> PathBuf {
        self.dir.join("final.json")
    }

    pub fn write_step(&self, index: u32, step: Step, state: &WorkflowState) -> Result<PathBuf> {
        let path = self.step_path(index, step);
        self.write_json(&path, state)?;
        Ok(path)
    }

    pub fn write_final<T: Serialize>(&self, value: &T) -> Result<PathBuf> {
        let path = self.final_path();
        self.write_json(&path, value)?;
        Ok(path)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create run log dir {}", self.dir.display()))?;
        let mut buf = serde_json::to_string_pretty(value).context("serialize run log entry")?;
        buf.push('\n');
        fs::write(path, buf).with_context(|| format!("write {}", path.display()))
    }
}
