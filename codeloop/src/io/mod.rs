//! Side-effecting pieces of the workflow: config, model calls, sandboxed processes.

pub mod config;
pub mod gateway;
pub mod openai;
pub mod process;
pub mod prompt;
pub mod run_log;
pub mod sandbox;
