//! Native tools exposed to the chat agent.
//!
//! Tools are registered in a [`ToolRegistry`], which renders them as
//! `OpenAI` function schemas for the driver and dispatches calls by name.

pub mod calculate;
pub mod search;

pub use calculate::CalculateTool;
pub use search::SearchTool;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

/// A tool the model can call.
#[async_trait]
pub trait Tool: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object.
    fn schema(&self) -> serde_json::Value;
    /// Run the tool. The returned text is fed back to the model verbatim.
    async fn call(&self, args: serde_json::Value) -> anyhow::Result<String>;
}

/// Name-indexed set of tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<HashMap<String, Arc<dyn Tool>>>,
    order: Arc<Vec<String>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

impl ToolRegistry {
    /// Registry with no tools.
    #[must_use]
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// The default DocuChat toolset: `search` and `calculate`.
    #[must_use]
    pub fn docuchat_defaults() -> Self {
        Self::new_empty()
            .with_tool(Arc::new(SearchTool::new()))
            .with_tool(Arc::new(CalculateTool))
    }

    /// Add a tool, replacing any tool registered under the same name.
    #[must_use]
    pub fn with_tool(self, tool: Arc<dyn Tool>) -> Self {
        let name = tool.name().to_string();
        let mut tools = (*self.tools).clone();
        let mut order = (*self.order).clone();
        if tools.insert(name.clone(), tool).is_none() {
            order.push(name);
        }
        Self {
            tools: Arc::new(tools),
            order: Arc::new(order),
        }
    }

    /// Registered tool names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        (*self.order).clone()
    }

    /// Tool definitions in `OpenAI` function format.
    #[must_use]
    pub fn openai_tools_json(&self) -> Vec<serde_json::Value> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.schema(),
                    }
                })
            })
            .collect()
    }

    /// Dispatch a call by tool name.
    pub async fn call_tool(&self, name: &str, args: serde_json::Value) -> anyhow::Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| anyhow!("unknown tool '{name}'"))?;
        tool.call(args).await
    }
}
