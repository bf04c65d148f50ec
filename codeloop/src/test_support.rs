//! Test-only helpers: a scripted completion backend and a hermetic config.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use crate::io::config::{CodeloopConfig, GatewayConfig, ModelsConfig, SandboxConfig, StepModels};
use crate::io::gateway::{BackendError, CompletionBackend, CompletionRequest};

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<String, VecDeque<String>>,
    failures: HashMap<String, BackendError>,
    calls: Vec<CompletionRequest>,
}

/// Completion backend answering from per-model scripts.
///
/// Each model has a reply queue; the last reply repeats once the queue is down
/// to one entry. Models registered with [`ScriptedBackend::fail`] always fail.
/// Models with neither are rejected with a 404. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
    // Models that have been switched to failing after construction.
    outages: Mutex<HashSet<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, model: &str, text: &str) -> Self {
        self.replies(model, [text])
    }

    pub fn replies<'a>(self, model: &str, texts: impl IntoIterator<Item = &'a str>) -> Self {
        self.script
            .lock()
            .expect("script lock")
            .replies
            .entry(model.to_string())
            .or_default()
            .extend(texts.into_iter().map(str::to_string));
        self
    }

    pub fn fail(self, model: &str, error: BackendError) -> Self {
        self.script
            .lock()
            .expect("script lock")
            .failures
            .insert(model.to_string(), error);
        self
    }

    /// Make every later call to `model` fail with a transport error.
    pub fn take_down(&self, model: &str) {
        self.outages
            .lock()
            .expect("outages lock")
            .insert(model.to_string());
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.script.lock().expect("script lock").calls.clone()
    }

    pub fn called_models(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.model).collect()
    }

    fn answer(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let down = self
            .outages
            .lock()
            .expect("outages lock")
            .contains(&request.model);
        let mut script = self.script.lock().expect("script lock");
        script.calls.push(request.clone());
        if down {
            return Err(BackendError::Transport(format!("{} is down", request.model)));
        }
        if let Some(error) = script.failures.get(&request.model) {
            return Err(error.clone());
        }
        let Some(queue) = script.replies.get_mut(&request.model) else {
            return Err(BackendError::Rejected {
                status: 404,
                body: format!("no scripted reply for {}", request.model),
            });
        };
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        reply.ok_or_else(|| BackendError::Rejected {
            status: 404,
            body: format!("no scripted reply for {}", request.model),
        })
    }
}

impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.answer(request)
    }
}

fn single(model: &str, temperature: f32) -> StepModels {
    StepModels {
        models: vec![model.to_string()],
        temperature,
    }
}

/// Config whose model names equal the step names and whose sandbox runs `sh`.
///
/// Scratch directories land under `scratch_root`; there are no gateway delays.
pub fn test_config(scratch_root: &Path) -> CodeloopConfig {
    CodeloopConfig {
        cycle_limit: 3,
        max_steps: 100,
        run_log_dir: None,
        gateway: GatewayConfig {
            transient_delay_ms: 0,
            ..GatewayConfig::default()
        },
        models: ModelsConfig {
            plan: single("plan", 0.7),
            route: single("route", 0.3),
            generate: single("generate", 0.2),
            verify: single("verify", 0.2),
            evaluate: single("evaluate", 0.3),
        },
        sandbox: SandboxConfig {
            timeout_secs: 5,
            execute_command: vec!["sh".to_string(), "{file}".to_string()],
            test_command: vec!["sh".to_string(), "{file}".to_string()],
            source_file: "solution.sh".to_string(),
            test_file: "test_solution.sh".to_string(),
            scratch_root: Some(scratch_root.to_path_buf()),
            ..SandboxConfig::default()
        },
    }
}

/// Whether `pid` names a live (non-zombie) process. Reads `/proc`, so it is
/// only meaningful on Linux.
pub fn process_running(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The state letter follows the parenthesised command name.
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next())
        .is_some_and(|state| state != 'Z')
}

/// Poll until `pid` is gone, for at most two seconds. Returns whether it went away.
pub async fn wait_for_exit(pid: u32) -> bool {
    for _ in 0..40 {
        if !process_running(pid) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    !process_running(pid)
}

/// Parse one pid per line, skipping anything that is not a number.
pub fn parse_pids(text: &str) -> Vec<u32> {
    text.lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}
