//! Tool hosting supports.
//!
//! The pipeline talks to tools only through [`ToolHost`]. A host may live
//! in another process (see the stdio adapter in the `relay` crate) or in
//! this one, in which case [`LocalToolHost`] dispatches calls to [`Tool`]
//! implementations directly.

mod error;
mod host;
mod object;
mod registry;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub use host::{ToolDescriptor, ToolHost};
pub use registry::LocalToolHost;

/// The result of a tool call.
pub type ToolResult = Result<String, Error>;

/// A tool that can be called by the pipeline.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// The tool can be context-aware, meaning it can access additional information
/// about the current execution context, such as an output directory. To do
/// this, make the context an immutable state of the tool, which can be set
/// during initialization, and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}
