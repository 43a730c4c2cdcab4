use crate::api::AppState;
use crate::error::Result;
use crate::metrics::{gather_metrics, UPTIME_SECONDS};
use crate::protocol::{format_sse_frame, InvocationContext, McpResponse, ProtocolError};
use crate::sync::SyncResult;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub capabilities: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.started_at.elapsed().as_secs();
    UPTIME_SECONDS.set(uptime as f64);

    let info = state.server.info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.service_name.clone(),
        version: info.version.clone(),
        uptime_seconds: uptime,
        capabilities: state.server.registry().len(),
    })
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

async fn dispatch(state: &AppState, body: &[u8], ctx: &InvocationContext) -> McpResponse {
    match serde_json::from_slice::<Value>(body) {
        Ok(raw) => state.server.handle_value(raw, ctx).await,
        Err(e) => {
            tracing::warn!(request_id = %ctx.request_id, error = %e, "Undecodable MCP body");
            McpResponse::failure(
                None,
                ProtocolError::internal(format!("Invalid request: {}", e)),
            )
        }
    }
}

/// JSON request, JSON response; protocol errors still answer 200
pub async fn mcp(State(state): State<AppState>, ctx: InvocationContext, body: Bytes) -> Json<McpResponse> {
    Json(dispatch(&state, &body, &ctx).await)
}

/// Same dispatch, answered as a single server-sent event
pub async fn mcp_sse(State(state): State<AppState>, ctx: InvocationContext, body: Bytes) -> Response {
    let response = dispatch(&state, &body, &ctx).await;
    let frame = match serde_json::to_value(&response) {
        Ok(payload) => format_sse_frame(&payload),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode MCP response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        frame,
    )
        .into_response()
}

/// External trigger for one sync pass
pub async fn trigger_sync(State(state): State<AppState>, ctx: InvocationContext) -> Result<Json<SyncResult>> {
    tracing::info!(request_id = %ctx.request_id, user_id = %ctx.user_id, "Sync triggered over HTTP");
    let result = state.pipeline.run().await?;
    Ok(Json(result))
}
