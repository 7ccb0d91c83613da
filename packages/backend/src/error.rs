//! Stable error tags (spec §7). One variant per named tag so calling code
//! can match instead of string-sniffing — grounded on the teacher's
//! `thiserror`-based error enums (e.g. the sandboxing module's
//! `SandboxError`) in preference to an untyped `anyhow::Error` at this
//! boundary, since the spec calls these out as a stable contract.

use workspaced_core::path::PathError;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("path escape: {0}")]
    PathEscape(#[from] PathError),

    #[error("empty command")]
    EmptyCommand,

    #[error("empty path")]
    EmptyPath,

    #[error("dangerous operation rejected: {reason}")]
    DangerousOperation { reason: String },

    #[error("unsafe command: {reason}")]
    UnsafeCommand { reason: String },

    #[error("command '{command}' failed: {stderr_tail}")]
    ExecFailed { command: String, stderr_tail: String },

    #[error("failed to spawn command '{command}': {source}")]
    ExecError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read '{path}': {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list '{path}': {source}")]
    LsFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing utility: {utility}")]
    MissingUtilities { utility: String },

    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    #[error("operation not implemented on this backend: {operation}")]
    NotImplemented { operation: String },

    #[error("operation timed out")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("backend is in an invalid state (destroyed or not yet connected)")]
    InvalidState,

    #[error("authentication failed")]
    AuthFailed,
}

impl BackendError {
    /// Stable short tag used by the MCP adapter and the daemon's HTTP
    /// status mapping — see SPEC_FULL.md §7.
    pub fn tag(&self) -> &'static str {
        match self {
            BackendError::PathEscape(_) => "path-escape",
            BackendError::EmptyCommand => "empty-command",
            BackendError::EmptyPath => "empty-path",
            BackendError::DangerousOperation { .. } => "dangerous-operation",
            BackendError::UnsafeCommand { .. } => "unsafe-command",
            BackendError::ExecFailed { .. } => "exec-failed",
            BackendError::ExecError { .. } => "exec-error",
            BackendError::ReadFailed { .. } => "read-failed",
            BackendError::WriteFailed { .. } => "write-failed",
            BackendError::LsFailed { .. } => "ls-failed",
            BackendError::MissingUtilities { .. } => "missing-utilities",
            BackendError::KeyNotFound { .. } => "key-not-found",
            BackendError::NotImplemented { .. } => "not-implemented",
            BackendError::Timeout => "timeout",
            BackendError::ConnectionClosed => "connection-closed",
            BackendError::InvalidState => "invalid-state",
            BackendError::AuthFailed => "auth-failed",
        }
    }
}
