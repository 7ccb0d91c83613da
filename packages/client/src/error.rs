//! `workspaced_client`'s own error type. Kept separate from
//! `workspaced_backend::BackendError` (spec §7's stable tag set belongs to
//! backend operations, not client-side transport setup) — grounded on the
//! teacher's `kodegen_mcp_client::ClientError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("backend construction failed: {0}")]
    Backend(#[from] workspaced_backend::BackendError),

    #[error("failed to spawn local daemon child process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to connect MCP transport: {0}")]
    Connection(String),

    #[error("MCP initialization failed: {0}")]
    Init(#[source] rmcp::service::ClientInitializeError),

    #[error("invalid remote client configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
