//! `codeloop` command line: run the workflow once and print the result as JSON.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use codeloop::api::{ErrorResponse, RunResponse};
use codeloop::core::extract::extract;
use codeloop::engine;
use codeloop::exit_codes;
use codeloop::io::config::{CodeloopConfig, DEFAULT_CONFIG_PATH, load_config, write_config};
use codeloop::logging;

#[derive(Parser)]
#[command(
    name = "codeloop",
    version,
    about = "Plan, generate, test and evaluate code with language models in a bounded loop"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Run the workflow for a goal and print the final state as JSON.
    Run {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Override `cycle_limit` from the config file.
        #[arg(long)]
        cycle_limit: Option<u32>,
        /// Abort the whole run after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Write per-step state snapshots under this directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// What to build; multiple words are joined with spaces.
        #[arg(required = true)]
        goal: Vec<String>,
    },
    /// Print the fenced code blocks of FILE (or stdin) as a JSON array.
    Extract { file: Option<PathBuf> },
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Run {
            config,
            cycle_limit,
            timeout_secs,
            log_dir,
            goal,
        } => {
            let goal = goal.join(" ");
            cmd_run(&config, &goal, cycle_limit, timeout_secs, log_dir).await
        }
        Command::Extract { file } => cmd_extract(file.as_deref()),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &CodeloopConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

async fn cmd_run(
    config_path: &Path,
    goal: &str,
    cycle_limit: Option<u32>,
    timeout_secs: Option<u64>,
    log_dir: Option<PathBuf>,
) -> Result<i32> {
    if goal.trim().is_empty() {
        print_json(&ErrorResponse::new("goal must not be empty"))?;
        return Ok(exit_codes::INVALID);
    }

    let mut config = load_config(config_path)?;
    if let Some(limit) = cycle_limit {
        config.cycle_limit = limit;
    }
    if let Some(dir) = log_dir {
        config.run_log_dir = Some(dir);
    }

    let workflow = match engine::connect(config) {
        Ok(workflow) => workflow,
        Err(err) => {
            print_json(&ErrorResponse::new(err.to_string()))?;
            return Ok(exit_codes::INVALID);
        }
    };

    let outcome = match timeout_secs {
        Some(secs) => {
            match tokio::time::timeout(Duration::from_secs(secs), workflow.run(goal)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    print_json(&ErrorResponse::new(format!(
                        "run timed out after {secs}s"
                    )))?;
                    return Ok(exit_codes::ABORTED);
                }
            }
        }
        None => workflow.run(goal).await,
    };
    info!(run_id = %outcome.run_id, stop = ?outcome.stop, "run complete");
    print_json(&RunResponse::from(&outcome.final_state))?;
    Ok(exit_codes::OK)
}

fn cmd_extract(file: Option<&Path>) -> Result<i32> {
    let text = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read stdin")?;
            buf
        }
    };
    print_json(&extract(&text))?;
    Ok(exit_codes::OK)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
