//! Client-side WebSocket-SSH transport (spec component C6).
//!
//! The WebSocket leg is `tokio-tungstenite` (grounded on the pack's several
//! tungstenite-based MCP clients); the SSH leg is `russh`, the closest
//! external analog in the retrieval pack being `chipsenkbeil-distant`'s SSH
//! backend. SFTP is `russh-sftp`, opened lazily and cached per session.

mod bridge;
pub mod config;
pub mod error;
mod handler;
mod transport;

pub use config::{SshConfig, KEEPALIVE_COUNT_MAX};
pub use error::TransportError;
pub use transport::{ExecOutcome, SshTransport, TransportStatus};
