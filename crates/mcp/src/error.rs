use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to spawn {executable}: {source}")]
    Spawn {
        executable: String,
        source: std::io::Error,
    },

    #[error("MCP stdio transport not opened")]
    NotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCP request \"{method}\" timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("MCP process closed unexpectedly")]
    Closed,

    #[error("MCP error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
