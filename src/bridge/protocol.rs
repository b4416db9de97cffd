//! Wire types for the worker protocol (JSON-RPC 2.0, one object per line).

use super::invocation::Outcome;
use super::schema::ToolDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const NOT_INITIALIZED: i32 = -32002;

/// JSON-RPC request.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: Value, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.to_string(),
            params: Some(params),
        }
    }
}

/// JSON-RPC response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Name and version of either end of the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    pub version: String,
}

impl PeerInfo {
    pub fn this_crate() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Handshake request params.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client_info: PeerInfo,
}

/// Handshake response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: PeerInfo,
    pub capabilities: ServerCapabilities,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Discovery response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<ToolDescriptor>,
}

/// Tool call request params.
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Tool call response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub outcome: OutcomeKind,
    pub payload: String,
}

impl From<Outcome> for ToolCallResult {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success(payload) => Self {
                outcome: OutcomeKind::Success,
                payload,
            },
            Outcome::Failure(payload) => Self {
                outcome: OutcomeKind::Failure,
                payload,
            },
        }
    }
}

impl From<ToolCallResult> for Outcome {
    fn from(result: ToolCallResult) -> Self {
        match result.outcome {
            OutcomeKind::Success => Outcome::Success(result.payload),
            OutcomeKind::Failure => Outcome::Failure(result.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_result_wire_shape() {
        let result = ToolCallResult::from(Outcome::Failure("bad input".into()));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"outcome": "failure", "payload": "bad input"})
        );
    }

    #[test]
    fn test_error_response_omits_result() {
        let response = RpcResponse::error(None, PARSE_ERROR, "Parse error");
        let text = serde_json::to_string(&response).unwrap();
        assert!(!text.contains("result"));
        assert!(text.contains("\"id\":null"));
    }

    #[test]
    fn test_request_parses_without_params() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"1","method":"tools/list"}"#).unwrap();
        assert_eq!(request.method, METHOD_TOOLS_LIST);
        assert!(request.params.is_none());
    }
}
