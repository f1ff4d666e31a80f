use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use relay_model::ModelProvider;

use super::Pipeline;
use crate::artifact::{
    Clock, DEFAULT_REPORT_DIR, DEFAULT_TRANSCRIPT_DIR, SystemClock,
};
use crate::executor::{
    DEFAULT_TOOL_TIMEOUT, DefaultArgument, ExecutionEngine, FailurePolicy,
    default_arguments,
};
use crate::model_client::ModelClient;
use crate::planner::{DEFAULT_PLAN_TIMEOUT, PlanGenerator};
use crate::synthesizer::{DEFAULT_SYNTHESIS_TIMEOUT, ResponseSynthesizer};
use crate::tool::ToolHost;
use crate::transcript::TranscriptWriter;

/// [`Pipeline`] builder.
pub struct PipelineBuilder {
    model_client: ModelClient,
    tool_host: Arc<dyn ToolHost>,
    report_dir: PathBuf,
    transcript_dir: PathBuf,
    plan_timeout: Duration,
    tool_timeout: Duration,
    synthesis_timeout: Duration,
    failure_policy: FailurePolicy,
    default_arguments: Vec<DefaultArgument>,
    clock: Arc<dyn Clock>,
}

impl PipelineBuilder {
    /// Creates a new builder with the specified model provider and tool
    /// host.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(
        provider: P,
        tool_host: Arc<dyn ToolHost>,
    ) -> Self {
        Self::with_model_client(ModelClient::new(provider), tool_host)
    }

    /// Creates a new builder that shares an existing model client.
    pub fn with_model_client(
        model_client: ModelClient,
        tool_host: Arc<dyn ToolHost>,
    ) -> Self {
        Self {
            model_client,
            tool_host,
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
            transcript_dir: PathBuf::from(DEFAULT_TRANSCRIPT_DIR),
            plan_timeout: DEFAULT_PLAN_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            failure_policy: FailurePolicy::default(),
            default_arguments: default_arguments(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the directory sentiment reports are named under.
    #[inline]
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }

    /// Sets the directory transcripts are written to.
    #[inline]
    pub fn with_transcript_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transcript_dir = dir.into();
        self
    }

    /// Sets the planning timeout.
    #[inline]
    pub fn with_plan_timeout(mut self, timeout: Duration) -> Self {
        self.plan_timeout = timeout;
        self
    }

    /// Sets the timeout of each tool call.
    #[inline]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Sets the synthesis timeout.
    #[inline]
    pub fn with_synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.synthesis_timeout = timeout;
        self
    }

    /// Sets what happens when a tool call fails.
    #[inline]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Replaces the default argument rules.
    #[inline]
    pub fn with_default_arguments(
        mut self,
        rules: impl Into<Vec<DefaultArgument>>,
    ) -> Self {
        self.default_arguments = rules.into();
        self
    }

    /// Sets the clock artifact names are stamped with.
    #[inline]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Builds the pipeline.
    pub fn build(self) -> Pipeline {
        Pipeline {
            model_client: self.model_client,
            tool_host: self.tool_host,
            report_dir: self.report_dir,
            transcript_dir: self.transcript_dir,
            clock: self.clock,
            planner: PlanGenerator::new(self.plan_timeout),
            engine: ExecutionEngine::new(
                self.tool_timeout,
                self.failure_policy,
                self.default_arguments,
            ),
            synthesizer: ResponseSynthesizer::new(self.synthesis_timeout),
            transcript_writer: TranscriptWriter,
        }
    }
}
