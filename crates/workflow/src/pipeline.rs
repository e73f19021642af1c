//! Static pipelines: steps, built-in definitions and config-defined ones.
//!
//! A [`Step`] carries everything needed to run it: the role, the fixed system
//! prompt, an input builder over the run context, and an optional result key.
//! Pipelines are registered once and read-only afterwards.

use agentrelay_config::PipelineConfig;
use agentrelay_core::agent::AgentRole;
use agentrelay_core::context::{FINAL_SUMMARY_KEY, GENERATED_CODE_KEY, PipelineContext};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds a step's user message from the results gathered so far.
pub type InputBuilder = Arc<dyn Fn(&PipelineContext) -> String + Send + Sync>;

/// One step of a static pipeline.
#[derive(Clone)]
pub struct Step {
    pub role: AgentRole,
    pub system_prompt: String,
    pub input: InputBuilder,
    pub output_key: Option<String>,
}

impl Step {
    /// A step using the role's standard system prompt.
    pub fn new(
        role: AgentRole,
        input: impl Fn(&PipelineContext) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            system_prompt: role.system_prompt(),
            role,
            input: Arc::new(input),
            output_key: None,
        }
    }

    /// A step whose input is rendered from a `{user_prompt}` / `{results.KEY}`
    /// template.
    pub fn templated(role: AgentRole, template: impl Into<String>) -> Self {
        let template = template.into();
        Self::new(role, move |ctx| render_template(&template, ctx))
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn build_input(&self, ctx: &PipelineContext) -> String {
        (self.input)(ctx)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("role", &self.role)
            .field("output_key", &self.output_key)
            .finish_non_exhaustive()
    }
}

/// A named, ordered list of steps.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<Step>,
    pub enabled: bool,
}

impl Pipeline {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
            enabled: true,
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Role names in execution order.
    pub fn role_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.role.as_str()).collect()
    }
}

impl From<&PipelineConfig> for Pipeline {
    fn from(config: &PipelineConfig) -> Self {
        let mut pipeline = Pipeline::new(&config.id, &config.name, &config.description);
        pipeline.enabled = config.enabled;
        for step_config in &config.steps {
            let mut step = Step::templated(AgentRole::parse(&step_config.role), &step_config.input);
            step.output_key = step_config.output_key.clone();
            pipeline.steps.push(step);
        }
        pipeline
    }
}

/// Render `{user_prompt}` and `{results.KEY}` placeholders.
///
/// Missing result keys render as an empty string. Any other brace group is
/// left as written.
pub fn render_template(template: &str, ctx: &PipelineContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let name = &after[..close];
        match name {
            "user_prompt" => out.push_str(&ctx.user_prompt),
            _ => match name.strip_prefix("results.") {
                Some(key) => out.push_str(ctx.result(key).unwrap_or_default()),
                None => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            },
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Registered pipelines, in registration order.
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    pipelines: Vec<Pipeline>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in pipelines.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for pipeline in builtin_pipelines() {
            registry.register(pipeline);
        }
        registry
    }

    /// Built-ins followed by the configured pipelines.
    pub fn from_config(configs: &[PipelineConfig]) -> Self {
        let mut registry = Self::with_builtins();
        for config in configs {
            registry.register(Pipeline::from(config));
        }
        registry
    }

    /// Add a pipeline. One with an existing id replaces it in place.
    pub fn register(&mut self, pipeline: Pipeline) {
        match self.pipelines.iter_mut().find(|p| p.id == pipeline.id) {
            Some(existing) => {
                debug!(pipeline = %pipeline.id, "Replacing registered pipeline");
                *existing = pipeline;
            }
            None => self.pipelines.push(pipeline),
        }
    }

    /// Look up a pipeline by id, enabled or not.
    pub fn get(&self, id: &str) -> Option<&Pipeline> {
        self.pipelines.iter().find(|p| p.id == id)
    }

    /// Enabled pipelines only.
    pub fn enabled(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.iter().filter(|p| p.enabled)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

const REQUIREMENTS_KEY: &str = "requirements";
const ANALYSIS_KEY: &str = "analysis";
const CODE_REVIEW_KEY: &str = "code_review";
const RESEARCH_KEY: &str = "research";

fn result_or_none<'a>(ctx: &'a PipelineContext, key: &str) -> &'a str {
    ctx.result(key).unwrap_or("(not available)")
}

/// The pipelines every orchestrator starts with.
pub fn builtin_pipelines() -> Vec<Pipeline> {
    vec![
        code_development(),
        analysis_only(),
        quick_fix(),
        research(),
        legacy_review(),
    ]
}

fn interpreter_step() -> Step {
    Step::new(AgentRole::Interpreter, |ctx| {
        format!("Interpret this request into clear requirements:\n\n{}", ctx.user_prompt)
    })
    .with_output_key(REQUIREMENTS_KEY)
}

fn code_development() -> Pipeline {
    Pipeline::new(
        "code-development",
        "Code Development",
        "Interpret, analyze, implement, review and summarize a coding task",
    )
    .step(interpreter_step())
    .step(
        Step::new(AgentRole::Analysis, |ctx| {
            format!(
                "Request:\n{}\n\nRequirements:\n{}\n\nAnalyze the problem and propose an approach.",
                ctx.user_prompt,
                result_or_none(ctx, REQUIREMENTS_KEY)
            )
        })
        .with_output_key(ANALYSIS_KEY),
    )
    .step(
        Step::new(AgentRole::Coder, |ctx| {
            format!(
                "Requirements:\n{}\n\nAnalysis:\n{}\n\nWrite the implementation.",
                result_or_none(ctx, REQUIREMENTS_KEY),
                result_or_none(ctx, ANALYSIS_KEY)
            )
        })
        .with_output_key(GENERATED_CODE_KEY),
    )
    .step(
        Step::new(AgentRole::CodeJudge, |ctx| {
            format!(
                "Requirements:\n{}\n\nCode under review:\n{}",
                result_or_none(ctx, REQUIREMENTS_KEY),
                result_or_none(ctx, GENERATED_CODE_KEY)
            )
        })
        .with_output_key(CODE_REVIEW_KEY),
    )
    .step(
        Step::new(AgentRole::Supervisor, |ctx| {
            format!(
                "Original request:\n{}\n\nGenerated code:\n{}\n\nReview:\n{}\n\n\
                 Write the final summary.",
                ctx.user_prompt,
                result_or_none(ctx, GENERATED_CODE_KEY),
                result_or_none(ctx, CODE_REVIEW_KEY)
            )
        })
        .with_output_key(FINAL_SUMMARY_KEY),
    )
}

fn analysis_only() -> Pipeline {
    Pipeline::new("analysis-only", "Analysis Only", "A single analysis pass over the request")
        .step(
            Step::new(AgentRole::Analysis, |ctx| ctx.user_prompt.clone())
                .with_output_key(ANALYSIS_KEY),
        )
}

fn quick_fix() -> Pipeline {
    Pipeline::new("quick-fix", "Quick Fix", "Interpret, patch and check a small fix")
        .step(interpreter_step())
        .step(
            Step::new(AgentRole::Coder, |ctx| {
                format!(
                    "Request:\n{}\n\nRequirements:\n{}\n\nWrite the smallest correct fix.",
                    ctx.user_prompt,
                    result_or_none(ctx, REQUIREMENTS_KEY)
                )
            })
            .with_output_key(GENERATED_CODE_KEY),
        )
        .step(
            Step::new(AgentRole::Judge, |ctx| {
                format!(
                    "Request:\n{}\n\nProposed fix:\n{}",
                    ctx.user_prompt,
                    result_or_none(ctx, GENERATED_CODE_KEY)
                )
            })
            .with_output_key(CODE_REVIEW_KEY),
        )
}

fn research() -> Pipeline {
    Pipeline::new("research", "Research", "Gather background, analyze it and summarize")
        .step(interpreter_step())
        .step(
            Step::new(AgentRole::Retrieval, |ctx| {
                format!(
                    "Requirements:\n{}\n\nGather the relevant background.",
                    result_or_none(ctx, REQUIREMENTS_KEY)
                )
            })
            .with_output_key(RESEARCH_KEY),
        )
        .step(
            Step::new(AgentRole::Analysis, |ctx| {
                format!(
                    "Request:\n{}\n\nBackground:\n{}",
                    ctx.user_prompt,
                    result_or_none(ctx, RESEARCH_KEY)
                )
            })
            .with_output_key(ANALYSIS_KEY),
        )
        .step(
            Step::new(AgentRole::Supervisor, |ctx| {
                format!(
                    "Original request:\n{}\n\nFindings:\n{}\n\nWrite the final summary.",
                    ctx.user_prompt,
                    result_or_none(ctx, ANALYSIS_KEY)
                )
            })
            .with_output_key(FINAL_SUMMARY_KEY),
        )
}

fn legacy_review() -> Pipeline {
    Pipeline::new("legacy-review", "Legacy Review", "Superseded by code-development")
        .step(
            Step::templated(AgentRole::CodeJudge, "{user_prompt}").with_output_key(CODE_REVIEW_KEY),
        )
        .disabled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrelay_config::StepConfig;

    fn ctx_with(results: &[(&str, &str)]) -> PipelineContext {
        let mut ctx = PipelineContext::new("fix the parser", 3);
        for (k, v) in results {
            ctx.set_result(*k, *v);
        }
        ctx
    }

    #[test]
    fn template_substitutes_prompt_and_results() {
        let ctx = ctx_with(&[("analysis", "looks fine")]);
        let out = render_template("Task: {user_prompt}\nNotes: {results.analysis}", &ctx);
        assert_eq!(out, "Task: fix the parser\nNotes: looks fine");
    }

    #[test]
    fn template_missing_key_renders_empty() {
        let ctx = ctx_with(&[]);
        assert_eq!(render_template("[{results.nope}]", &ctx), "[]");
    }

    #[test]
    fn template_leaves_unknown_groups_alone() {
        let ctx = ctx_with(&[]);
        assert_eq!(render_template("{\"a\": {other}} {", &ctx), "{\"a\": {other}} {");
    }

    #[test]
    fn builtins_are_registered_in_order() {
        let registry = PipelineRegistry::with_builtins();
        let ids: Vec<&str> = registry.enabled().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["code-development", "analysis-only", "quick-fix", "research"]);
        assert!(!registry.get("legacy-review").unwrap().enabled);
    }

    #[test]
    fn code_development_shape() {
        let registry = PipelineRegistry::with_builtins();
        let pipeline = registry.get("code-development").unwrap();
        assert_eq!(
            pipeline.role_names(),
            vec!["interpreter", "analysis", "coder", "code-judge", "supervisor"]
        );
        assert_eq!(pipeline.steps[2].output_key.as_deref(), Some(GENERATED_CODE_KEY));
        assert_eq!(pipeline.steps[4].output_key.as_deref(), Some(FINAL_SUMMARY_KEY));
    }

    #[test]
    fn step_inputs_read_prior_results() {
        let registry = PipelineRegistry::with_builtins();
        let coder = &registry.get("code-development").unwrap().steps[2];
        let input = coder.build_input(&ctx_with(&[("requirements", "REQ"), ("analysis", "ANA")]));
        assert!(input.contains("REQ"));
        assert!(input.contains("ANA"));
    }

    #[test]
    fn config_pipeline_replaces_builtin() {
        let config = PipelineConfig {
            id: "analysis-only".into(),
            name: "Custom analysis".into(),
            description: String::new(),
            enabled: true,
            steps: vec![StepConfig {
                role: "security_auditor".into(),
                output_key: Some("audit".into()),
                input: "Audit: {user_prompt}".into(),
            }],
        };
        let registry = PipelineRegistry::from_config(&[config]);
        assert_eq!(registry.len(), 5);

        let pipeline = registry.get("analysis-only").unwrap();
        assert_eq!(pipeline.name, "Custom analysis");
        assert_eq!(pipeline.steps[0].role, AgentRole::Custom("security_auditor".into()));
        assert!(pipeline.steps[0].system_prompt.contains("specialized security_auditor agent"));
        assert_eq!(pipeline.steps[0].build_input(&ctx_with(&[])), "Audit: fix the parser");
    }
}
