//! The opt-in second listener (`--conventional-ssh`, spec §6): a plain
//! TCP port speaking real SSH, for clients that want to point an
//! ordinary `ssh`/`sftp` binary at the daemon instead of tunneling over
//! `/ssh`. Shares `ssh_server::WorkspacedSshHandler` with the WebSocket
//! route; only the transport (raw `TcpStream` vs. WS-bridged duplex)
//! differs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::TcpListener;

use workspaced_backend::Backend;

use crate::ssh_route::parse_user_password_pairs;
use crate::ssh_server::{AuthPolicy, WorkspacedSshHandler};

pub fn build_auth_policy(
    users: &[String],
    public_key: Option<&str>,
    authorized_keys_file: Option<&std::path::Path>,
) -> anyhow::Result<AuthPolicy> {
    let user_table: HashMap<String, String> = parse_user_password_pairs(users);

    let mut keys = Vec::new();
    if let Some(raw) = public_key {
        keys.push(russh_keys::parse_public_key_base64(
            raw.split_whitespace().nth(1).unwrap_or(raw),
        )?);
    }
    if let Some(path) = authorized_keys_file {
        let contents = std::fs::read_to_string(path)?;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(encoded) = line.split_whitespace().nth(1) {
                if let Ok(key) = russh_keys::parse_public_key_base64(encoded) {
                    keys.push(key);
                }
            }
        }
    }

    if user_table.is_empty() && keys.is_empty() {
        log::warn!(
            "--conventional-ssh enabled with no --ssh-users/--ssh-public-key/--ssh-authorized-keys: \
             the conventional listener will accept no authenticated session"
        );
    }

    Ok(AuthPolicy::credentialed(user_table, keys))
}

pub async fn serve(
    port: u16,
    ssh_config: Arc<russh::server::Config>,
    backend: Arc<dyn Backend>,
    auth: AuthPolicy,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("conventional SSH listener bound on port {port}");

    loop {
        let (stream, peer) = listener.accept().await?;
        let ssh_config = ssh_config.clone();
        let backend = backend.clone();
        let auth = auth.clone();

        tokio::spawn(async move {
            let handler = WorkspacedSshHandler::new(backend, auth);
            if let Err(err) = russh::server::run_stream(ssh_config, stream, handler).await {
                log::warn!("conventional SSH session from {peer} ended with error: {err}");
            }
        });
    }
}
