//! Workflow configuration stored as TOML (default `.codeloop/config.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::Step;

pub const DEFAULT_CONFIG_PATH: &str = ".codeloop/config.toml";

/// Top-level workflow configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to the
/// values the workflow was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CodeloopConfig {
    /// Number of Evaluate cycles after which the run must terminate.
    pub cycle_limit: u32,

    /// Step budget checked at each routing point.
    pub max_steps: u32,

    /// Directory for per-step state snapshots. Disabled when unset.
    pub run_log_dir: Option<PathBuf>,

    pub gateway: GatewayConfig,
    pub models: ModelsConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    /// OpenAI-compatible API root (without `/chat/completions`).
    pub base_url: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    /// Fixed pause after a transient failure before trying the next model.
    pub transient_delay_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            request_timeout_secs: 60,
            transient_delay_ms: 1000,
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn transient_delay(&self) -> Duration {
        Duration::from_millis(self.transient_delay_ms)
    }
}

/// Model preference list and sampling temperature for one step kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepModels {
    pub models: Vec<String>,
    pub temperature: f32,
}

impl StepModels {
    fn new(models: &[&str], temperature: f32) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    pub plan: StepModels,
    pub route: StepModels,
    pub generate: StepModels,
    pub verify: StepModels,
    pub evaluate: StepModels,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            plan: StepModels::new(&["llama-3.3-70b-versatile", "qwen-2.5-32b"], 0.7),
            route: StepModels::new(&["qwen-2.5-32b", "llama-3.3-70b-versatile"], 0.3),
            generate: StepModels::new(
                &["deepseek-r1-distill-llama-70b", "llama-3.3-70b-versatile"],
                0.2,
            ),
            verify: StepModels::new(
                &[
                    "qwen-2.5-32b",
                    "llama-3.3-70b-versatile",
                    "deepseek-r1-distill-llama-70b",
                ],
                0.2,
            ),
            evaluate: StepModels::new(&["llama-3.3-70b-versatile", "qwen-2.5-32b"], 0.3),
        }
    }
}

impl ModelsConfig {
    /// Settings for a model-backed step (`Route` included). `None` for `Terminate`.
    pub fn for_step(&self, step: Step) -> Option<&StepModels> {
        match step {
            Step::Plan => Some(&self.plan),
            Step::Route => Some(&self.route),
            Step::Generate => Some(&self.generate),
            Step::Verify => Some(&self.verify),
            Step::Evaluate => Some(&self.evaluate),
            Step::Terminate => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock limit for one sandboxed process.
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Command for running an artifact. `{file}` is replaced by the source file name.
    pub execute_command: Vec<String>,
    /// Command for running a test artifact. `{file}` is replaced by the test file name.
    pub test_command: Vec<String>,
    /// File name the artifact is materialized under (tests import it by stem).
    pub source_file: String,
    /// File name the test artifact is materialized under.
    pub test_file: String,
    /// Parent directory for scratch directories. System temp dir when unset.
    pub scratch_root: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            output_limit_bytes: 100_000,
            execute_command: vec!["python3".to_string(), "{file}".to_string()],
            test_command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "pytest".to_string(),
                "-q".to_string(),
                "{file}".to_string(),
            ],
            source_file: "solution.py".to_string(),
            test_file: "test_solution.py".to_string(),
            scratch_root: None,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Module name tests use to import the artifact (`solution` for `solution.py`).
    pub fn source_module(&self) -> &str {
        Path::new(&self.source_file)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.source_file)
    }
}

impl Default for CodeloopConfig {
    fn default() -> Self {
        Self {
            cycle_limit: 3,
            max_steps: 100,
            run_log_dir: None,
            gateway: GatewayConfig::default(),
            models: ModelsConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl CodeloopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cycle_limit == 0 {
            return Err(anyhow!("cycle_limit must be > 0"));
        }
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.gateway.base_url.trim().is_empty() {
            return Err(anyhow!("gateway.base_url must not be empty"));
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(anyhow!("gateway.request_timeout_secs must be > 0"));
        }
        for step in [
            Step::Plan,
            Step::Route,
            Step::Generate,
            Step::Verify,
            Step::Evaluate,
        ] {
            let Some(models) = self.models.for_step(step) else {
                continue;
            };
            if models.models.is_empty() || models.models.iter().any(|m| m.trim().is_empty()) {
                return Err(anyhow!("models.{step}.models must be a non-empty list of names"));
            }
            if !(0.0..=2.0).contains(&models.temperature) {
                return Err(anyhow!("models.{step}.temperature must be within 0.0..=2.0"));
            }
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        for (key, command) in [
            ("execute_command", &self.sandbox.execute_command),
            ("test_command", &self.sandbox.test_command),
        ] {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(anyhow!("sandbox.{key} must be a non-empty array"));
            }
        }
        for (key, name) in [
            ("source_file", &self.sandbox.source_file),
            ("test_file", &self.sandbox.test_file),
        ] {
            if !is_plain_file_name(name) {
                return Err(anyhow!("sandbox.{key} must be a plain file name, got '{name}'"));
            }
        }
        if self.sandbox.source_file == self.sandbox.test_file {
            return Err(anyhow!("sandbox.source_file and sandbox.test_file must differ"));
        }
        Ok(())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CodeloopConfig::default()`.
pub fn load_config(path: &Path) -> Result<CodeloopConfig> {
    if !path.exists() {
        let cfg = CodeloopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CodeloopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CodeloopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
