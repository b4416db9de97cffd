//! Planner backed by an OpenAI-compatible chat completions API.

use super::planner::{PlanStep, Planner, ToolSelection, Turn};
use crate::bridge::ToolDescriptor;
use crate::config::PlannerSettings;
use crate::error::{Result, SpliceError};
use crate::openai::create_client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionCall,
    FunctionObject,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Default system prompt preamble. The tool list is appended at request time.
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful audio and video editing assistant.

When the user asks for an editing task, call the appropriate tools. Several
tools may be called in one step when they do not depend on each other; when
one step needs the output of another, wait for the first result.

Tool results are file paths in the output directory. Always give the user the
full path of every file you produced. If a tool fails, explain why and suggest
a fix instead of retrying blindly."#;

/// Planner that asks a chat model to pick tools.
pub struct OpenAIPlanner {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl OpenAIPlanner {
    pub fn new(settings: &PlannerSettings) -> Result<Self> {
        Ok(Self {
            client: create_client(settings)?,
            model: settings.model.clone(),
            temperature: settings.temperature,
            system_prompt: settings
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }
}

#[async_trait]
impl Planner for OpenAIPlanner {
    async fn plan(&self, history: &[Turn], tools: &[ToolDescriptor]) -> Result<PlanStep> {
        let messages = build_messages(&system_prompt(&self.system_prompt, tools), history)?;

        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature);
        if !tools.is_empty() {
            request.tools(tools.iter().map(tool_definition).collect::<Vec<_>>());
        }
        let request = request.build().map_err(planner_error)?;

        debug!("Planning with {} turn(s) of history", history.len());

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| SpliceError::OpenAI(format!("Planner API error: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SpliceError::Planner("No response from model".to_string()))?;

        match choice.message.tool_calls {
            Some(calls) if !calls.is_empty() => {
                Ok(PlanStep::Invoke(calls.into_iter().map(to_selection).collect()))
            }
            _ => Ok(PlanStep::Respond(choice.message.content.unwrap_or_default())),
        }
    }
}

fn planner_error(e: impl std::fmt::Display) -> SpliceError {
    SpliceError::Planner(e.to_string())
}

/// System prompt with the discovered tool list appended.
fn system_prompt(preamble: &str, tools: &[ToolDescriptor]) -> String {
    let mut prompt = preamble.trim_end().to_string();
    if !tools.is_empty() {
        prompt.push_str("\n\nAvailable tools:\n");
        for tool in tools {
            prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        }
    }
    prompt
}

/// Function-calling definition generated from a descriptor.
fn tool_definition(tool: &ToolDescriptor) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: tool.name.clone(),
            description: Some(tool.description.clone()),
            parameters: Some(tool.input_schema()),
            strict: None,
        },
    }
}

fn to_selection(call: ChatCompletionMessageToolCall) -> ToolSelection {
    // Arguments that are not valid JSON are passed through as a string and
    // rejected by the proxy with a message the model can act on.
    let arguments = serde_json::from_str(&call.function.arguments)
        .unwrap_or(Value::String(call.function.arguments));
    ToolSelection {
        call_id: call.id,
        tool_name: call.function.name,
        arguments,
    }
}

fn build_messages(system: &str, history: &[Turn]) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system.to_string())
            .build()
            .map_err(planner_error)?
            .into(),
    ];

    for turn in history {
        let message: ChatCompletionRequestMessage = match turn {
            Turn::User(text) => ChatCompletionRequestUserMessageArgs::default()
                .content(text.clone())
                .build()
                .map_err(planner_error)?
                .into(),
            Turn::Assistant(text) => ChatCompletionRequestAssistantMessageArgs::default()
                .content(text.clone())
                .build()
                .map_err(planner_error)?
                .into(),
            Turn::ToolRequests(selections) => {
                let calls: Vec<ChatCompletionMessageToolCall> = selections
                    .iter()
                    .map(|s| ChatCompletionMessageToolCall {
                        id: s.call_id.clone(),
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionCall {
                            name: s.tool_name.clone(),
                            arguments: s.arguments.to_string(),
                        },
                    })
                    .collect();
                ChatCompletionRequestAssistantMessageArgs::default()
                    .tool_calls(calls)
                    .build()
                    .map_err(planner_error)?
                    .into()
            }
            Turn::ToolResult { call_id, content } => ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(call_id.clone())
                .content(content.clone())
                .build()
                .map_err(planner_error)?
                .into(),
        };
        messages.push(message);
    }

    Ok(messages)
}
