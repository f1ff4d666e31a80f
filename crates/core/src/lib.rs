//! Core logic including plan generation, plan execution, answer synthesis,
//! transcripts, etc.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod artifact;
mod error;
mod executor;
mod model_client;
mod pipeline;
pub mod plan;
mod planner;
mod synthesizer;
pub mod tool;
pub mod transcript;

pub use error::Error;
pub use executor::{
    ArtifactValue, DEFAULT_TOOL_TIMEOUT, DefaultArgument, ExecutionContext,
    ExecutionEngine, FailurePolicy, StepOutcome, StepRecord, default_arguments,
};
pub use model_client::{Completion, CompletionError, ModelClient};
pub use pipeline::{Pipeline, PipelineBuilder, QueryOutcome};
pub use planner::{DEFAULT_PLAN_TIMEOUT, PlanGenerator};
pub use synthesizer::{DEFAULT_SYNTHESIS_TIMEOUT, ResponseSynthesizer};
