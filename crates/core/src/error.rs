use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model_client::CompletionError;
use crate::tool;

/// Errors that fail a query.
///
/// None of them poison the pipeline, the next query starts fresh.
#[derive(Debug, Error)]
pub enum Error {
    /// The tool catalog could not be fetched from the tool host.
    #[error("tool host unavailable: {0}")]
    Connection(tool::Error),
    /// The planning completion did not finish in time.
    #[error("plan generation timed out after {}s", .0.as_secs_f64())]
    PlanTimeout(Duration),
    /// The planning completion failed.
    #[error("plan generation failed: {0}")]
    Plan(CompletionError),
    /// The synthesis completion did not finish in time.
    #[error("answer synthesis timed out after {}s", .0.as_secs_f64())]
    SynthesisTimeout(Duration),
    /// The synthesis completion failed.
    #[error("answer synthesis failed: {0}")]
    Synthesis(CompletionError),
    /// A tool failed and the failure policy is
    /// [`Abort`](crate::FailurePolicy::Abort).
    #[error("tool `{tool}` failed: {error}")]
    ToolInvocation {
        /// Name of the failed tool.
        tool: String,
        /// What the tool host reported.
        error: tool::Error,
    },
    /// The transcript could not be written.
    #[error("failed to write transcript {}: {source}", .path.display())]
    Transcript {
        /// Where the transcript was going.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn from_plan_completion(err: CompletionError) -> Self {
        match err {
            CompletionError::Timeout(limit) => Error::PlanTimeout(limit),
            err => Error::Plan(err),
        }
    }

    pub(crate) fn from_synthesis_completion(err: CompletionError) -> Self {
        match err {
            CompletionError::Timeout(limit) => Error::SynthesisTimeout(limit),
            err => Error::Synthesis(err),
        }
    }
}
