//! Folds tool results into the final answer.

use std::time::Duration;

use relay_model::{ModelMessage, ModelRequest, ToolCallResult};

use crate::Error;
use crate::executor::{ExecutionContext, StepOutcome};
use crate::model_client::ModelClient;

/// How long the synthesis completion may take by default.
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(60);

/// Produces the final answer of a query.
#[derive(Clone, Debug)]
pub struct ResponseSynthesizer {
    timeout: Duration,
}

impl Default for ResponseSynthesizer {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_SYNTHESIS_TIMEOUT)
    }
}

impl ResponseSynthesizer {
    /// Creates a synthesizer whose completions give up after `timeout`.
    #[inline]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Builds the synthesis request: the query, then one tool message per
    /// executed step. No tools are attached.
    pub fn build_request(
        &self,
        query: &str,
        context: &ExecutionContext,
    ) -> ModelRequest {
        let mut messages = vec![ModelMessage::User(query.to_owned())];
        messages.extend(context.records().iter().map(|record| {
            let content = match &record.outcome {
                StepOutcome::Success(output) => {
                    format!("Tool {} executed with result: {output}", record.name)
                }
                StepOutcome::Failure(err) => {
                    format!("Tool {} failed: {err}", record.name)
                }
            };
            ModelMessage::Tool(ToolCallResult {
                id: record.name.clone(),
                content,
            })
        }));
        ModelRequest::with_messages(messages)
    }

    /// Requests the final answer.
    ///
    /// This is called exactly once per query, also for empty plans, and is
    /// never retried.
    pub async fn synthesize(
        &self,
        client: &ModelClient,
        query: &str,
        context: &ExecutionContext,
    ) -> Result<String, Error> {
        let req = self.build_request(query, context);
        info!("synthesizing from {} tool results", context.records().len());
        let completion = client
            .complete(req, self.timeout)
            .await
            .map_err(Error::from_synthesis_completion)?;
        Ok(completion.text)
    }
}
