//! Turns a [`workspaced_core::config::BackendConfig`] into a concrete,
//! boxed [`Backend`] (spec §4.12 "constructs the right backend, defaulting
//! to local when `kind` is absent"). Used by [`crate::WorkspacedClient`]
//! whenever the caller wants the backend itself rather than an MCP
//! session — e.g. embedding `workspaced` directly in another Rust process.

use std::sync::Arc;

use workspaced_backend::Backend;
use workspaced_backend_local::{LocalBackend, LocalBackendOptions};
use workspaced_backend_memory::MemoryBackend;
use workspaced_backend_remote::{RemoteBackend, RemoteBackendOptions};
use workspaced_core::config::BackendConfig;

use crate::error::ClientError;

pub async fn build_backend(config: &BackendConfig) -> Result<Arc<dyn Backend>, ClientError> {
    match config {
        BackendConfig::Local {
            root_dir,
            isolation,
            shell,
            prevent_dangerous,
            max_output_length,
        } => {
            let backend = LocalBackend::new(LocalBackendOptions {
                root_dir: std::path::PathBuf::from(root_dir.as_str()),
                isolation: *isolation,
                shell: shell_command(*shell),
                prevent_dangerous: *prevent_dangerous,
                max_output_length: *max_output_length,
                on_dangerous: None,
            })
            .await?;
            Ok(Arc::new(backend))
        }
        BackendConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendConfig::Remote {
            host,
            port,
            path,
            auth_token,
            root_dir,
            max_retries,
            prevent_dangerous,
        } => Ok(Arc::new(RemoteBackend::new(RemoteBackendOptions {
            host: host.clone(),
            port: *port,
            path: path.clone(),
            auth_token: auth_token.clone(),
            root_dir: root_dir.clone(),
            max_retries: *max_retries,
            prevent_dangerous: *prevent_dangerous,
            ..Default::default()
        }))),
    }
}

fn shell_command(kind: workspaced_core::config::ShellKind) -> String {
    use workspaced_core::config::ShellKind;
    match kind {
        ShellKind::Bash => "bash".to_string(),
        ShellKind::Sh => "sh".to_string(),
        ShellKind::Auto if cfg!(target_os = "windows") => "cmd".to_string(),
        ShellKind::Auto => "bash".to_string(),
    }
}
