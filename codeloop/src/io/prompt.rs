//! Prompt rendering for the model-backed steps.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::router::ADVICE_OPTIONS;
use crate::core::types::WorkflowState;
use crate::io::config::SandboxConfig;

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const ROUTE_TEMPLATE: &str = include_str!("prompts/route.md");
const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const VERIFY_TEMPLATE: &str = include_str!("prompts/verify.md");
const EVALUATE_TEMPLATE: &str = include_str!("prompts/evaluate.md");

/// Sandbox reports fed into the evaluate prompt.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationReports<'a> {
    pub execute: &'a str,
    pub test: &'a str,
}

/// Template engine wrapper around minijinja.
///
/// Built once per workflow; rendering is read-only and safe to share across runs.
pub struct PromptEngine {
    env: Environment<'static>,
    module: String,
    source_file: String,
}

fn non_empty(text: &str) -> Option<&str> {
    Some(text.trim()).filter(|s| !s.is_empty())
}

impl PromptEngine {
    pub fn new(sandbox: &SandboxConfig) -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("plan", PLAN_TEMPLATE),
            ("route", ROUTE_TEMPLATE),
            ("generate", GENERATE_TEMPLATE),
            ("verify", VERIFY_TEMPLATE),
            ("evaluate", EVALUATE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load {name} prompt template"))?;
        }
        Ok(Self {
            env,
            module: sandbox.source_module().to_string(),
            source_file: sandbox.source_file.clone(),
        })
    }

    pub fn render_plan(&self, state: &WorkflowState) -> Result<String> {
        self.render(
            "plan",
            context! {
                goal => state.goal.trim(),
                module => self.module,
            },
        )
    }

    pub fn render_route(&self, state: &WorkflowState) -> Result<String> {
        self.render(
            "route",
            context! {
                has_code => state.has_artifact(),
                has_tests => state.has_verification(),
                cycle => state.cycle,
                cycle_limit => state.cycle_limit,
                assessment => non_empty(&state.assessment),
                options => ADVICE_OPTIONS,
            },
        )
    }

    pub fn render_generate(&self, state: &WorkflowState) -> Result<String> {
        self.render(
            "generate",
            context! {
                plan => state.plan.trim(),
                artifact => non_empty(&state.artifact),
                assessment => non_empty(&state.assessment),
                module => self.module,
            },
        )
    }

    pub fn render_verify(&self, state: &WorkflowState) -> Result<String> {
        self.render(
            "verify",
            context! {
                artifact => state.artifact.trim_end(),
                plan => state.plan.trim(),
                module => self.module,
                source_file => self.source_file,
            },
        )
    }

    pub fn render_evaluate(
        &self,
        state: &WorkflowState,
        reports: EvaluationReports<'_>,
    ) -> Result<String> {
        self.render(
            "evaluate",
            context! {
                artifact => state.artifact.trim_end(),
                verification => state.verification.trim_end(),
                plan => state.plan.trim(),
                execute_report => reports.execute.trim_end(),
                test_report => reports.test.trim_end(),
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))
    }
}
