mod builder;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Instrument;

pub use builder::PipelineBuilder;

use crate::Error;
use crate::artifact::{ArtifactNames, Clock};
use crate::executor::{ExecutionEngine, StepRecord};
use crate::model_client::ModelClient;
use crate::plan::Plan;
use crate::planner::PlanGenerator;
use crate::synthesizer::ResponseSynthesizer;
use crate::tool::{ToolDescriptor, ToolHost};
use crate::transcript::TranscriptWriter;

/// Everything a query produced.
#[derive(Clone, Debug)]
pub struct QueryOutcome {
    /// The synthesized answer.
    pub answer: String,
    /// The artifact names derived before planning.
    pub artifacts: ArtifactNames,
    /// The plan the model produced.
    pub plan: Plan,
    /// Every executed step in execution order.
    pub records: Vec<StepRecord>,
}

/// Turns queries into answers by planning and running tool calls.
///
/// A pipeline holds no per-query state, so one instance can serve
/// concurrent queries.
pub struct Pipeline {
    model_client: ModelClient,
    tool_host: Arc<dyn ToolHost>,
    report_dir: PathBuf,
    transcript_dir: PathBuf,
    clock: Arc<dyn Clock>,
    planner: PlanGenerator,
    engine: ExecutionEngine,
    synthesizer: ResponseSynthesizer,
    transcript_writer: TranscriptWriter,
}

impl Pipeline {
    /// Returns the catalog of the tool host.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        self.tool_host.list_tools().await.map_err(Error::Connection)
    }

    /// Answers `query`.
    ///
    /// The artifact names are fixed first and announced to the planner.
    /// The plan then runs in order, the results are synthesized into one
    /// answer, and the exchange is saved as a transcript.
    pub async fn process_query(&self, query: &str) -> Result<QueryOutcome, Error> {
        let span = info_span!("query", query = %query);
        self.process_query_inner(query).instrument(span).await
    }

    async fn process_query_inner(
        &self,
        query: &str,
    ) -> Result<QueryOutcome, Error> {
        let artifacts = ArtifactNames::derive(
            query,
            self.clock.now(),
            &self.report_dir,
            &self.transcript_dir,
        );
        debug!("derived artifacts: {artifacts:?}");
        let annotated_query = artifacts.annotate(query);

        let tools = self.list_tools().await?;
        let plan = self
            .planner
            .generate(&self.model_client, &annotated_query, &tools)
            .await?;
        let context = self
            .engine
            .execute(self.tool_host.as_ref(), &plan, &artifacts)
            .await?;
        let answer = self
            .synthesizer
            .synthesize(&self.model_client, &annotated_query, &context)
            .await?;

        self.transcript_writer
            .write(&artifacts.transcript_path, query, &answer)
            .await?;
        info!("answered, transcript at {}", artifacts.transcript_path.display());

        Ok(QueryOutcome {
            answer,
            artifacts,
            plan,
            records: context.records().to_vec(),
        })
    }
}
