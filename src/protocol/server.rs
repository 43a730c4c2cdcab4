use crate::metrics::{
    CAPABILITY_CALLS_TOTAL, CAPABILITY_CALL_DURATION_SECONDS, PROTOCOL_REQUESTS_TOTAL,
};
use crate::protocol::{
    CapabilityRegistry, InvocationContext, McpRequest, McpResponse, ProtocolError,
    PROTOCOL_VERSION,
};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

/// Identity reported by `initialize`
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Stateless dispatcher over an immutable capability registry
///
/// Built once per process and shared behind an `Arc`; every call is
/// independent so concurrent use needs no locking.
pub struct McpServer {
    info: ServerInfo,
    registry: CapabilityRegistry,
}

impl McpServer {
    pub fn new(info: ServerInfo, registry: CapabilityRegistry) -> Self {
        tracing::info!(
            server = %info.name,
            version = %info.version,
            tools = ?registry.names(),
            "MCP server initialized"
        );
        Self { info, registry }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Route one request; never fails, every problem becomes an error response
    pub async fn handle(&self, request: McpRequest, ctx: &InvocationContext) -> McpResponse {
        let id = request.id.clone();
        let method = request.method.clone();

        tracing::info!(
            method = %method,
            request_id = %ctx.request_id,
            user_id = %ctx.user_id,
            "Handling MCP request"
        );

        let outcome = AssertUnwindSafe(self.dispatch(request, ctx))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(result)) => McpResponse::success(id, result),
            Ok(Err(error)) => McpResponse::failure(id, error),
            Err(panic) => {
                let cause = panic_message(panic.as_ref());
                tracing::error!(method = %method, cause = %cause, "Request handling panicked");
                McpResponse::failure(id, ProtocolError::internal(cause))
            }
        };

        let outcome_label = response
            .error
            .as_ref()
            .and_then(ProtocolError::error_code)
            .map(|code| code.as_str())
            .unwrap_or("ok");
        PROTOCOL_REQUESTS_TOTAL
            .with_label_values(&[method_label(&method), outcome_label])
            .inc();

        if let Some(error) = &response.error {
            tracing::warn!(
                method = %method,
                request_id = %ctx.request_id,
                code = error.code,
                message = %error.message,
                "MCP request failed"
            );
        }

        response
    }

    /// Like `handle`, for a body that has not been decoded yet
    pub async fn handle_value(&self, raw: Value, ctx: &InvocationContext) -> McpResponse {
        match serde_json::from_value::<McpRequest>(raw.clone()) {
            Ok(request) => self.handle(request, ctx).await,
            Err(e) => {
                let id = raw.get("id").cloned();
                let missing_method =
                    raw.is_object() && !raw.get("method").is_some_and(Value::is_string);
                let error = if missing_method {
                    ProtocolError::method_not_found("undefined")
                } else {
                    ProtocolError::internal(format!("Invalid request: {}", e))
                };

                let outcome_label = error
                    .error_code()
                    .map(|code| code.as_str())
                    .unwrap_or("INTERNAL_ERROR");
                PROTOCOL_REQUESTS_TOTAL
                    .with_label_values(&["unknown", outcome_label])
                    .inc();
                tracing::warn!(request_id = %ctx.request_id, error = %e, "Malformed MCP request");
                McpResponse::failure(id, error)
            }
        }
    }

    async fn dispatch(
        &self,
        request: McpRequest,
        ctx: &InvocationContext,
    ) -> Result<Value, ProtocolError> {
        match request.method.as_str() {
            "initialize" => Ok(self.initialize_result()),
            "tools/list" | "list" => Ok(self.list_result()),
            "tools/call" | "call" => self.call(request.params, ctx).await,
            other => Err(ProtocolError::method_not_found(other)),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version
            }
        })
    }

    fn list_result(&self) -> Value {
        let tools: Vec<_> = self.registry.descriptors().collect();
        json!({ "tools": tools })
    }

    async fn call(
        &self,
        params: Option<Value>,
        ctx: &InvocationContext,
    ) -> Result<Value, ProtocolError> {
        let params = params.unwrap_or(Value::Null);
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ProtocolError::invalid_params("Invalid params: name is required"))?;

        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| ProtocolError::invalid_params(format!("Tool not found: {}", name)))?;

        let args = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(value) => value.clone(),
        };

        let missing = entry.missing_required(&args);
        if !missing.is_empty() {
            return Err(ProtocolError::invalid_params(format!(
                "Invalid params: missing required argument(s): {}",
                missing.join(", ")
            )));
        }

        tracing::info!(tool = %name, user_id = %ctx.user_id, "Executing tool");

        let start = Instant::now();
        let result = entry.capability().execute(args, ctx).await;
        CAPABILITY_CALL_DURATION_SECONDS
            .with_label_values(&[name])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(value) => {
                CAPABILITY_CALLS_TOTAL
                    .with_label_values(&[name, "success"])
                    .inc();
                let text = serde_json::to_string_pretty(&value).map_err(|e| {
                    ProtocolError::internal(format!("Failed to serialize tool result: {}", e))
                })?;
                Ok(json!({
                    "content": [
                        { "type": "text", "text": text }
                    ]
                }))
            }
            Err(e) => {
                CAPABILITY_CALLS_TOTAL
                    .with_label_values(&[name, "error"])
                    .inc();
                tracing::error!(
                    tool = %name,
                    error_code = e.error_code(),
                    error = %e,
                    "Tool execution failed"
                );
                Err(ProtocolError::tool_execution_failed(&e))
            }
        }
    }
}

/// Render a payload as one server-push frame
pub fn format_sse_frame(payload: &Value) -> String {
    format!("data: {}\n\n", payload)
}

fn method_label(method: &str) -> &'static str {
    match method {
        "initialize" => "initialize",
        "tools/list" | "list" => "list",
        "tools/call" | "call" => "call",
        _ => "unknown",
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during request handling".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_frame_format() {
        assert_eq!(format_sse_frame(&json!({"a": 1})), "data: {\"a\":1}\n\n");
    }

    #[test]
    fn test_method_label_folds_unknown() {
        assert_eq!(method_label("tools/call"), "call");
        assert_eq!(method_label("foo"), "unknown");
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}
