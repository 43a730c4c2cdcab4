use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision reported by `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Inbound request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    #[serde(default = "default_jsonrpc", alias = "protocolVersion")]
    pub jsonrpc: String,

    /// Echoed verbatim; `Some(Value::Null)` keeps an explicit null
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,

    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }
}

/// Outbound response envelope; exactly one of `result` and `error` is set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpResponse {
    pub jsonrpc: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
}

impl McpResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, error: ProtocolError) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Protocol-tier error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MethodNotFound,
    InvalidParams,
    InternalError,
    ToolExecutionFailed,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ToolExecutionFailed => -32000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ToolExecutionFailed => "TOOL_EXECUTION_FAILED",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -32601 => Some(ErrorCode::MethodNotFound),
            -32602 => Some(ErrorCode::InvalidParams),
            -32603 => Some(ErrorCode::InternalError),
            -32000 => Some(ErrorCode::ToolExecutionFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[error("{message} ({code})")]
pub struct ProtocolError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Domain error codes are dropped here; only the message survives
    pub fn tool_execution_failed(cause: &impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::ToolExecutionFailed,
            format!("Tool execution failed: {}", cause),
        )
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

/// Caller identity supplied by the hosting platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationContext {
    pub user_id: String,
    pub user_arn: String,
    pub request_id: String,
}

impl InvocationContext {
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn new(
        user_id: Option<String>,
        user_arn: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            user_id: non_blank(user_id).unwrap_or_else(|| Self::ANONYMOUS.to_string()),
            user_arn: non_blank(user_arn).unwrap_or_else(|| Self::ANONYMOUS.to_string()),
            request_id: non_blank(request_id).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(None, None, None)
    }
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
