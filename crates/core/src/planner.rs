//! Asks the model for a tool-use plan.

use std::time::Duration;

use relay_model::{ModelMessage, ModelRequest, ModelTool, ToolChoice};

use crate::Error;
use crate::model_client::ModelClient;
use crate::plan::Plan;
use crate::tool::ToolDescriptor;

/// How long the planning completion may take by default.
pub const DEFAULT_PLAN_TIMEOUT: Duration = Duration::from_secs(60);

const PROMPT_HEADER: &str = "你是一个智能助手，负责把用户的请求拆解为工具调用计划。\
可用的工具如下，调用时必须使用列出的工具名称：\n";

const PROMPT_FOOTER: &str = "\n请按执行顺序规划需要调用的工具。\
如果后续步骤需要使用前一步的输出，请把参数值写成 {{工具名}} 占位符，\
例如 {\"text\": \"{{search_google}}\"}。\n\
只返回一个JSON数组，数组中每个对象包含 name 和 arguments 两个字段，不要返回其他内容。";

/// Generates plans by asking the model.
#[derive(Clone, Debug)]
pub struct PlanGenerator {
    timeout: Duration,
}

impl Default for PlanGenerator {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_PLAN_TIMEOUT)
    }
}

impl PlanGenerator {
    /// Creates a generator whose completions give up after `timeout`.
    #[inline]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Builds the planning request for `query`.
    ///
    /// The catalog is attached for description only, the model is not
    /// allowed to call tools.
    pub fn build_request(
        &self,
        query: &str,
        tools: &[ToolDescriptor],
    ) -> ModelRequest {
        let tool_list = tools
            .iter()
            .map(|tool| format!("{}: {}", tool.name, tool.description))
            .collect::<Vec<_>>()
            .join("\n");
        let system_prompt = format!("{PROMPT_HEADER}{tool_list}{PROMPT_FOOTER}");
        ModelRequest {
            messages: vec![
                ModelMessage::System(system_prompt),
                ModelMessage::User(query.to_owned()),
            ],
            tools: tools.iter().map(ModelTool::from).collect(),
            tool_choice: ToolChoice::None,
        }
    }

    /// Requests and parses a plan for `query`.
    ///
    /// An unparsable answer yields an empty plan. Only timeouts and model
    /// failures are errors.
    pub async fn generate(
        &self,
        client: &ModelClient,
        query: &str,
        tools: &[ToolDescriptor],
    ) -> Result<Plan, Error> {
        let req = self.build_request(query, tools);
        info!("requesting a plan, {} tools available", tools.len());
        let completion = client
            .complete(req, self.timeout)
            .await
            .map_err(Error::from_plan_completion)?;
        for call in &completion.tool_calls {
            warn!("ignoring tool call to `{}` during planning", call.name);
        }

        let plan = Plan::parse(&completion.text);
        debug!("parsed plan: {plan:?}");
        info!("plan has {} steps", plan.steps().len());
        Ok(plan)
    }
}
