//! `workspaced_client` (C12): accepts a [`BackendConfig`] or a pre-built
//! [`Backend`], and connects an MCP client/transport to whichever backend
//! it resolves to. The `workspaced` binary (`src/main.rs`) is a thin CLI
//! over this library.

pub mod backend;
pub mod error;
pub mod transport;

use std::sync::Arc;

use rmcp::service::{RoleClient, RunningService};
use workspaced_backend::Backend;
use workspaced_core::config::BackendConfig;

pub use error::ClientError;
pub use transport::WorkspacedTransport;

/// How this client was configured — either build-from-config (which also
/// determines how `get_mcp_transport` reaches the backend) or a backend
/// the caller already owns.
enum Source {
    Config(BackendConfig),
    Prebuilt(Arc<dyn Backend>),
}

pub struct WorkspacedClient {
    source: Source,
}

impl WorkspacedClient {
    pub fn from_config(config: BackendConfig) -> Self {
        Self {
            source: Source::Config(config),
        }
    }

    pub fn from_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            source: Source::Prebuilt(backend),
        }
    }

    /// Builds (or returns) the `Backend` this client talks to. Only
    /// meaningful for in-process use — an MCP session reaches the backend
    /// through its own transport instead, and may run in a different
    /// process (the spawned local daemon, or a remote daemon over HTTP).
    pub async fn backend(&self) -> Result<Arc<dyn Backend>, ClientError> {
        match &self.source {
            Source::Config(config) => backend::build_backend(config).await,
            Source::Prebuilt(b) => Ok(b.clone()),
        }
    }

    /// The raw transport for `scope` (spec §4.12), unconnected.
    ///
    /// * `Local`/`Memory` configs spawn `workspaced-daemon --local-only`
    ///   and connect over its stdio. `Memory` has no native daemon mode
    ///   (the daemon CLI has no `--kind` flag — see spec.md §6's flag
    ///   table), so it spawns the same binary pointed at a fresh temporary
    ///   directory; this is an ephemeral stand-in for a true in-memory
    ///   server process, not a shared backend (documented as an Open
    ///   Question resolution in DESIGN.md).
    /// * `Remote` connects rmcp's streamable-HTTP transport directly to
    ///   the daemon's `/mcp` route, no subprocess involved.
    /// * A pre-built backend has no daemon to spawn — MCP tool access to
    ///   an arbitrary `Arc<dyn Backend>` needs a daemon hosting it, so
    ///   callers with a pre-built backend should use `backend()` directly
    ///   instead of `get_mcp_transport`.
    pub async fn get_mcp_transport(
        &self,
        scope: Option<&str>,
    ) -> Result<WorkspacedTransport, ClientError> {
        match &self.source {
            Source::Config(BackendConfig::Remote {
                host,
                port,
                auth_token,
                ..
            }) => WorkspacedTransport::remote(transport::RemoteMcpEndpoint {
                host: host.clone(),
                port: *port,
                auth_token: auth_token.clone(),
                scope: scope.map(str::to_string),
            }),
            Source::Config(BackendConfig::Local { root_dir, .. }) => {
                WorkspacedTransport::local(transport::LocalDaemonSpawn {
                    root_dir: std::path::PathBuf::from(root_dir.as_str()),
                    scope_path: scope.map(str::to_string),
                })
                .await
            }
            Source::Config(BackendConfig::Memory) => {
                let tmp = tempfile::tempdir().map_err(ClientError::Io)?;
                let root_dir = tmp.path().to_path_buf();
                // Leak the guard: the spawned child owns the directory's
                // lifetime for as long as the connection is in use, and
                // cleaning it up eagerly here would race the child's startup.
                std::mem::forget(tmp);
                WorkspacedTransport::local(transport::LocalDaemonSpawn {
                    root_dir,
                    scope_path: scope.map(str::to_string),
                })
                .await
            }
            Source::Prebuilt(_) => Err(ClientError::InvalidConfig(
                "get_mcp_transport requires a BackendConfig; a pre-built backend has no daemon \
                 to connect an MCP transport to — use WorkspacedClient::backend() instead"
                    .to_string(),
            )),
        }
    }

    /// Connects `get_mcp_transport(scope)` and returns the running MCP
    /// client session.
    pub async fn get_mcp_client(
        &self,
        scope: Option<&str>,
    ) -> Result<RunningService<RoleClient, ()>, ClientError> {
        self.get_mcp_transport(scope).await?.connect().await
    }
}
