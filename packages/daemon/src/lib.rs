//! `workspaced_daemon` (C11): one process, one HTTP listener, serving
//! `/health`, `/mcp`, and `/ssh` over a single configured root
//! [`Backend`]. The binary entry point is `src/main.rs`; this library
//! crate exists so `packages/client` can reuse `build_root_backend` when
//! spawning a local daemon in `--local-only` mode, and so the daemon's
//! own integration tests can drive it without a subprocess.

pub mod auth;
pub mod cli;
pub mod conventional_ssh;
pub mod exec_scope;
pub mod hostkey;
pub mod http;
pub mod sftp_server;
pub mod ssh_route;
pub mod ssh_server;

use std::collections::HashMap;
use std::sync::Arc;

use workspaced_backend::Backend;
use workspaced_backend_local::{LocalBackend, LocalBackendOptions};
use workspaced_core::config::ShellKind;
use workspaced_scope::ScopedBackend;

use cli::Cli;
use exec_scope::ExecCapableScope;

/// `LocalBackendOptions::shell` wants a concrete shell command; the CLI's
/// `--shell auto` needs resolving to the same per-OS default the backend
/// itself would otherwise fall back to.
fn shell_command(kind: ShellKind) -> String {
    match kind {
        ShellKind::Bash => "bash".to_string(),
        ShellKind::Sh => "sh".to_string(),
        ShellKind::Auto => {
            if cfg!(target_os = "windows") {
                "cmd".to_string()
            } else {
                "bash".to_string()
            }
        }
    }
}

/// Builds the daemon's root backend: always a [`LocalBackend`] (the CLI
/// only ever configures a local root directory — spec §6 has no `--kind`
/// flag), wrapped in a [`ScopedBackend`] whose scope path is either
/// `--scope-path` or the empty string for "the whole root". Wrapping
/// unconditionally, rather than branching on whether a scope was given,
/// keeps exactly one concrete backend type flowing into both the MCP
/// adapter (which needs `ExecCapable` at compile time) and the SSH/SFTP
/// routes (which only need `Backend`).
pub async fn build_root_backend(cli: &Cli) -> anyhow::Result<Arc<ExecCapableScope>> {
    let scope_path = cli
        .validated_scope_path()
        .map_err(|e| anyhow::anyhow!(e))?
        .unwrap_or_default();

    let local = Arc::new(
        LocalBackend::new(LocalBackendOptions {
            root_dir: cli.root_dir.clone(),
            isolation: cli.isolation.into(),
            shell: shell_command(cli.shell.into()),
            prevent_dangerous: true,
            max_output_length: 1_000_000,
            on_dangerous: None,
        })
        .await?,
    );

    let scoped = ScopedBackend::new(local as Arc<dyn Backend>, &scope_path, HashMap::new())?;

    Ok(Arc::new(ExecCapableScope(scoped)))
}
