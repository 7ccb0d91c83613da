//! The `Backend` trait (spec §3/§9): the abstract contract implemented by
//! the local-filesystem, memory, remote, and scoped backends. Modeled as a
//! trait rather than a tagged union of function pointers, per the teacher's
//! `Tool` trait (`kodegen_mcp_tool::Tool`) which plays the same role for
//! MCP tools — one trait, many independent implementors, object-safe via
//! `#[async_trait]` so the daemon and pool can hold `Arc<dyn Backend>`.

pub mod error;
pub mod types;

pub use error::BackendError;
pub use types::{
    BackendKind, BackendStatus, DirEntry, Encoding, ExecOptions, ExecOutput, ExecResult, RmOptions,
    Stat,
};

use async_trait::async_trait;
use workspaced_core::status::ListenerId;

/// The abstract filesystem-plus-exec contract (spec §3 Backend).
///
/// All paths are relative to `root_dir()`. Implementations must resolve
/// every path through `workspaced_core::path::resolve_within` (directly, or
/// indirectly through a wrapped backend) before touching storage.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;
    fn root_dir(&self) -> String;
    fn status(&self) -> BackendStatus;

    async fn read(&self, path: &str) -> Result<Vec<u8>, BackendError>;
    async fn write(&self, path: &str, content: &[u8]) -> Result<(), BackendError>;
    async fn readdir(&self, path: &str) -> Result<Vec<String>, BackendError>;
    async fn readdir_with_stats(&self, path: &str) -> Result<Vec<DirEntry>, BackendError>;
    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), BackendError>;
    async fn rename(&self, from: &str, to: &str) -> Result<(), BackendError>;
    async fn rm(&self, path: &str, opts: RmOptions) -> Result<(), BackendError>;
    async fn stat(&self, path: &str) -> Result<Stat, BackendError>;
    async fn exists(&self, path: &str) -> Result<bool, BackendError>;
    async fn touch(&self, path: &str) -> Result<(), BackendError>;

    async fn exec(&self, command: &str, opts: ExecOptions) -> Result<ExecResult, BackendError>;

    /// Cancels in-flight operations and transitions to `Destroyed`;
    /// idempotent. Every operation after this returns `InvalidState`.
    async fn destroy(&self) -> Result<(), BackendError>;
}

/// Marker trait: implemented only by backends whose `exec` runs a real
/// shell. The MCP adapter (C10) uses this as a compile-time bound when
/// deciding whether to register the `exec` tool, instead of probing for a
/// method at runtime (spec §9 Design Notes).
pub trait ExecCapable: Backend {}

/// Subscribe to status changes on any backend that exposes a status
/// manager. Kept as a free function (rather than a trait method) since not
/// every wrapper (e.g. a scoped backend reading its parent's status
/// dynamically) owns its own `StatusManager`.
pub trait StatusSubscribable {
    fn subscribe_status<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&workspaced_core::status::StatusChange<BackendStatus>) + Send + Sync + 'static;
    fn unsubscribe_status(&self, id: ListenerId);
}
