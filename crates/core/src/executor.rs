//! Runs plans against a tool host.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::Instrument;

use crate::Error;
use crate::artifact::ArtifactNames;
use crate::plan::{ArgValue, Plan, PlanStep};
use crate::tool::{self, ToolHost};

/// How long a single tool call may take by default.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// What to do when a step fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FailurePolicy {
    /// Record the failure and run the remaining steps.
    #[default]
    Continue,
    /// Stop the plan and fail the query.
    Abort,
}

/// A per-query value that can fill a missing argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactValue {
    /// The sentiment report file name.
    ReportFilename,
    /// The sentiment report path.
    ReportPath,
}

impl ArtifactValue {
    fn resolve(self, artifacts: &ArtifactNames) -> Value {
        let value = match self {
            ArtifactValue::ReportFilename => artifacts.report_filename.clone(),
            ArtifactValue::ReportPath => {
                artifacts.report_path.display().to_string()
            }
        };
        Value::String(value)
    }
}

/// Injects an artifact into a tool's arguments when the plan omits it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DefaultArgument {
    /// The tool the rule applies to.
    pub tool: String,
    /// The argument to fill.
    pub argument: String,
    /// The value to fill it with.
    pub value: ArtifactValue,
}

impl DefaultArgument {
    /// Creates a rule.
    pub fn new(
        tool: impl Into<String>,
        argument: impl Into<String>,
        value: ArtifactValue,
    ) -> Self {
        Self {
            tool: tool.into(),
            argument: argument.into(),
            value,
        }
    }
}

/// Returns the built-in default argument rules.
///
/// `analyze_sentiment` writes its report under the derived file name, and
/// `send_email_with_attachment` attaches that report.
pub fn default_arguments() -> Vec<DefaultArgument> {
    vec![
        DefaultArgument::new(
            "analyze_sentiment",
            "filename",
            ArtifactValue::ReportFilename,
        ),
        DefaultArgument::new(
            "send_email_with_attachment",
            "attachment_path",
            ArtifactValue::ReportPath,
        ),
    ]
}

/// The outcome of one executed step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The tool returned this text.
    Success(String),
    /// The tool call failed.
    Failure(tool::Error),
}

impl StepOutcome {
    /// Returns `true` for [`StepOutcome::Success`].
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success(_))
    }
}

/// One executed step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepRecord {
    /// Name of the tool.
    pub name: String,
    /// The arguments after resolution and default injection.
    pub arguments: Map<String, Value>,
    /// What happened.
    pub outcome: StepOutcome,
}

/// The outputs collected while running one plan.
#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    outputs: HashMap<String, String>,
    records: Vec<StepRecord>,
}

impl ExecutionContext {
    /// Returns the latest successful output of the tool `name`.
    #[inline]
    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }

    /// Returns every executed step in execution order.
    #[inline]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    fn record(&mut self, record: StepRecord) {
        if let StepOutcome::Success(output) = &record.outcome {
            self.outputs.insert(record.name.clone(), output.clone());
        }
        self.records.push(record);
    }

    /// Resolves the arguments of `step`.
    ///
    /// Placeholders that name a tool without a successful output stay as
    /// their literal `{{name}}` text.
    pub fn resolve(&self, step: &PlanStep) -> Map<String, Value> {
        step.arguments
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    ArgValue::Literal(value) => value.clone(),
                    ArgValue::Placeholder(name) => match self.output(name) {
                        Some(output) => Value::String(output.to_owned()),
                        None => {
                            debug!("unresolved placeholder `{name}` in `{key}`");
                            value.to_value()
                        }
                    },
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Executes plans step by step.
#[derive(Clone, Debug)]
pub struct ExecutionEngine {
    timeout: Duration,
    policy: FailurePolicy,
    defaults: Vec<DefaultArgument>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TOOL_TIMEOUT,
            policy: FailurePolicy::default(),
            defaults: default_arguments(),
        }
    }
}

impl ExecutionEngine {
    /// Creates an engine.
    pub fn new(
        timeout: Duration,
        policy: FailurePolicy,
        defaults: Vec<DefaultArgument>,
    ) -> Self {
        Self {
            timeout,
            policy,
            defaults,
        }
    }

    /// Returns the failure policy of this engine.
    #[inline]
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Runs `plan` in order.
    ///
    /// Nothing is rolled back. Under [`FailurePolicy::Abort`] the first
    /// failure is returned as [`Error::ToolInvocation`] and completed side
    /// effects stay in place.
    pub async fn execute(
        &self,
        host: &dyn ToolHost,
        plan: &Plan,
        artifacts: &ArtifactNames,
    ) -> Result<ExecutionContext, Error> {
        let mut context = ExecutionContext::default();
        for (index, step) in plan.steps().iter().enumerate() {
            let mut arguments = context.resolve(step);
            self.inject_defaults(&step.name, &mut arguments, artifacts);

            let span = info_span!("plan step", index, tool = %step.name);
            let outcome = self
                .call(host, &step.name, arguments.clone())
                .instrument(span)
                .await;
            if let StepOutcome::Failure(err) = &outcome {
                if self.policy == FailurePolicy::Abort {
                    return Err(Error::ToolInvocation {
                        tool: step.name.clone(),
                        error: err.clone(),
                    });
                }
            }
            context.record(StepRecord {
                name: step.name.clone(),
                arguments,
                outcome,
            });
        }
        Ok(context)
    }

    fn inject_defaults(
        &self,
        tool: &str,
        arguments: &mut Map<String, Value>,
        artifacts: &ArtifactNames,
    ) {
        for rule in self.defaults.iter().filter(|rule| rule.tool == tool) {
            if !arguments.contains_key(&rule.argument) {
                trace!("injecting default `{}` into {tool}", rule.argument);
                arguments
                    .insert(rule.argument.clone(), rule.value.resolve(artifacts));
            }
        }
    }

    async fn call(
        &self,
        host: &dyn ToolHost,
        name: &str,
        arguments: Map<String, Value>,
    ) -> StepOutcome {
        debug!("calling tool with args: {arguments:?}");
        match timeout(self.timeout, host.call_tool(name, arguments)).await {
            Ok(Ok(output)) => {
                info!("tool succeeded");
                StepOutcome::Success(output)
            }
            Ok(Err(err)) => {
                warn!("tool failed: {err}");
                StepOutcome::Failure(err)
            }
            Err(_) => {
                warn!("tool timed out");
                StepOutcome::Failure(tool::Error::timeout().with_reason(
                    format!("no result within {}s", self.timeout.as_secs_f64()),
                ))
            }
        }
    }
}
