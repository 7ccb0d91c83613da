//! Transport-level error tags. `workspaced_backend_remote` (C7) maps these
//! onto the stable `BackendError` tags from spec §7; this crate stays
//! independent of the backend trait so it can be reused outside it.

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("ssh error: {0}")]
    Ssh(String),

    #[error("sftp error: {0}")]
    Sftp(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("operation timed out")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport is in an invalid state")]
    InvalidState,
}
