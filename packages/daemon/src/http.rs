//! Axum router wiring (spec §4.11/§6): `/health`, `/mcp`, `/ssh` on one
//! listener. `/mcp` is grounded on the pack's `catkins-mcp-bouncer` server
//! module (`StreamableHttpService` + `LocalSessionManager`, `nest_service`
//! into an `axum::Router`) — the closest retrieved precedent for mounting
//! an `rmcp` streamable-HTTP server under `axum`.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use serde::Serialize;

use workspaced_backend::{Backend, ExecCapable};
use workspaced_mcp::WorkspacedMcpServer;

use crate::auth::{require_bearer, AuthState};
use crate::ssh_route::{ssh_upgrade, SshRouteState};

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    root_dir: String,
}

async fn health(State(root_dir): State<Arc<str>>) -> impl IntoResponse {
    Json(HealthBody {
        status: "ok",
        root_dir: root_dir.to_string(),
    })
}

/// Builds the full router. `mcp_backend` is the statically exec-capable
/// backend the MCP adapter wraps (spec §9); `dyn_backend` is the same
/// backend type-erased for the `/ssh` route's exec+SFTP session, which
/// operates on the `Backend` trait directly rather than the `ExecCapable`
/// bound (every `Backend` impl has an `exec` method, capable or not — see
/// `workspaced_daemon::exec_scope`).
pub fn build_router<B>(
    mcp_backend: Arc<B>,
    dyn_backend: Arc<dyn Backend>,
    mcp_server_name: String,
    auth: AuthState,
    enable_ssh_ws: bool,
    ssh_state: SshRouteState,
) -> Router
where
    B: ExecCapable + 'static,
{
    let root_dir: Arc<str> = Arc::from(dyn_backend.root_dir());

    let mcp_service = StreamableHttpService::new(
        move || {
            Ok(WorkspacedMcpServer::new_with_exec(
                mcp_backend.clone(),
                mcp_server_name.clone(),
            ))
        },
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: Some(std::time::Duration::from_secs(15)),
        },
    );

    let mut router = Router::new()
        .route("/health", get(health).with_state(root_dir))
        .nest_service("/mcp", mcp_service);

    if enable_ssh_ws {
        router = router
            .route("/ssh", get(ssh_upgrade))
            .with_state(ssh_state);
    }

    router.layer(middleware::from_fn_with_state(auth, require_bearer))
}
