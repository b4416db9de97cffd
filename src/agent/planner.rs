//! Planning step abstraction.

use crate::bridge::ToolDescriptor;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A tool the planner wants called.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSelection {
    /// Planner-side id tying the result back to this request.
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolSelection {
    /// Arguments as an object, unwrapping a JSON-encoded string if needed.
    pub fn normalized_arguments(&self) -> Value {
        match &self.arguments {
            Value::String(raw) => {
                serde_json::from_str(raw).unwrap_or_else(|_| self.arguments.clone())
            }
            other => other.clone(),
        }
    }
}

impl std::fmt::Display for ToolSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.tool_name, self.arguments)
    }
}

/// One entry of the conversation the planner sees.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    User(String),
    Assistant(String),
    ToolRequests(Vec<ToolSelection>),
    ToolResult { call_id: String, content: String },
}

/// What the planner decided to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Final answer for the operator.
    Respond(String),
    /// Call these tools, then plan again with their results.
    Invoke(Vec<ToolSelection>),
}

/// Chooses the next step given the conversation and the available tools.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, history: &[Turn], tools: &[ToolDescriptor]) -> Result<PlanStep>;
}
