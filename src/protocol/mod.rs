//! JSON-RPC tool-invocation protocol
//!
//! `initialize`, `tools/list` (alias `list`) and `tools/call` (alias `call`)
//! are dispatched against a fixed [`CapabilityRegistry`]. Capability errors
//! surface as `TOOL_EXECUTION_FAILED`.

mod registry;
mod server;
mod types;

pub use registry::{Capability, CapabilityDescriptor, CapabilityRegistry, RegisteredCapability};
pub use server::{format_sse_frame, McpServer, ServerInfo};
pub use types::{
    ErrorCode, InvocationContext, McpRequest, McpResponse, ProtocolError, JSONRPC_VERSION,
    PROTOCOL_VERSION,
};
