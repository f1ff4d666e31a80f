use async_trait::async_trait;
use relay_model::ModelTool;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Error, ToolResult};

/// Describes a tool exposed by a tool host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name of the tool, unique within one catalog.
    pub name: String,
    /// Description of the tool.
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool input.
    #[serde(default)]
    pub input_schema: Value,
}

impl From<&ToolDescriptor> for ModelTool {
    fn from(descriptor: &ToolDescriptor) -> Self {
        ModelTool {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            parameters: descriptor.input_schema.clone(),
        }
    }
}

/// A service that lists and invokes tools.
///
/// One host is shared by every query of a pipeline, so implementations must
/// be reentrant.
#[async_trait]
pub trait ToolHost: Send + Sync {
    /// Returns the current tool catalog.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error>;

    /// Invokes the tool `name` and returns its textual output.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> ToolResult;
}
