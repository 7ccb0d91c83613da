//! `workspaced-daemon` (C11) entry point. Grounded on the teacher's
//! `ahma_mcp::main` for the stdio-serve + signal-handled shutdown shape,
//! and on `mcp_daemon::config::discover_certificate_paths` for treating
//! host-key material as the only thing this process persists.

use std::sync::Arc;

use clap::Parser;
use rmcp::ServiceExt;

use workspaced_backend::{Backend, ExecCapable};
use workspaced_daemon::auth::AuthState;
use workspaced_daemon::cli::Cli;
use workspaced_daemon::{build_root_backend, conventional_ssh, hostkey, http, ssh_route};
use workspaced_mcp::WorkspacedMcpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    cli.validated_scope_path().map_err(|e| anyhow::anyhow!(e))?;

    let backend = build_root_backend(&cli).await?;
    let mcp_server_name = backend.kind().mcp_server_name().to_string();

    if cli.local_only {
        log::info!("starting in --local-only mode: MCP over stdio, no HTTP listener");
        let server = WorkspacedMcpServer::new_with_exec(backend, mcp_server_name);
        let service = server.serve(rmcp::transport::stdio()).await?;
        service.waiting().await?;
        return Ok(());
    }

    let host_key_path = cli
        .ssh_host_key
        .clone()
        .unwrap_or_else(hostkey::default_host_key_path);
    let host_key = hostkey::load_or_generate(&host_key_path).await?;

    let ssh_config = Arc::new(russh::server::Config {
        keys: vec![host_key],
        ..Default::default()
    });

    let auth_state = AuthState::new(cli.auth_token.clone());
    let dyn_backend = backend.clone() as Arc<dyn workspaced_backend::Backend>;

    let ssh_route_state = ssh_route::SshRouteState {
        backend: dyn_backend.clone(),
        ssh_config: ssh_config.clone(),
        auth: auth_state.clone(),
    };

    let router = http::build_router(
        backend,
        dyn_backend.clone(),
        mcp_server_name,
        auth_state,
        !cli.disable_ssh_ws,
        ssh_route_state,
    );

    if cli.conventional_ssh {
        let auth_policy = conventional_ssh::build_auth_policy(
            &cli.ssh_users,
            cli.ssh_public_key.as_deref(),
            cli.ssh_authorized_keys.as_deref(),
        )?;
        let ssh_config = ssh_config.clone();
        let dyn_backend = dyn_backend.clone();
        let ssh_port = cli.ssh_port;
        tokio::spawn(async move {
            if let Err(err) =
                conventional_ssh::serve(ssh_port, ssh_config, dyn_backend, auth_policy).await
            {
                log::error!("conventional SSH listener exited with error: {err}");
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;
    log::info!(
        "workspaced-daemon listening on port {} (root: {})",
        cli.port,
        dyn_backend.root_dir()
    );

    let shutdown = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };
        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        log::info!("shutdown signal received");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
