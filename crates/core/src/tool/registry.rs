use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::object::{AnyTool, ToolObject};
use super::{Error, Tool, ToolDescriptor, ToolHost, ToolResult};

/// A tool host that runs [`Tool`] implementations in this process.
///
/// Tools are listed in the order they were added. Adding a tool with an
/// existing name replaces the earlier one in place.
#[derive(Clone, Default)]
pub struct LocalToolHost {
    tools: Vec<Arc<dyn ToolObject>>,
}

impl LocalToolHost {
    /// Creates an empty host.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool to this host.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let tool: Arc<dyn ToolObject> = Arc::new(AnyTool(tool));
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(index) => {
                debug!("replacing tool: {}", tool.name());
                self.tools[index] = tool;
            }
            None => self.tools.push(tool),
        }
    }

    /// Adds a tool and returns the host, for chained construction.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.add_tool(tool);
        self
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolHost for LocalToolHost {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        Ok(self.tools.iter().map(|tool| tool.descriptor()).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> ToolResult {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            warn!("tool not found: {name}");
            return Err(Error::not_found().with_reason(format!(
                "no tool named `{name}` is registered"
            )));
        };
        trace!("calling tool {name} with args: {arguments:?}");
        tool.execute(Value::Object(arguments)).await
    }
}
