//! JSON-RPC 2.0 over a subprocess's stdio, as spoken by MCP tool servers.

mod error;
mod pending;
pub mod protocol;
mod stdio_client;

pub use error::{Result, TransportError};
pub use protocol::{
    CallToolResult, ClientInfo, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ToolInfo,
};
pub use stdio_client::{StdioTransport, TransportOptions, DEFAULT_TIMEOUT};
