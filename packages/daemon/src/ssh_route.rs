//! The `/ssh` route (spec §6): upgrades to a WebSocket, then drives an
//! in-process `russh` server session over it. Accepts the bearer token
//! either as `Authorization: Bearer` or `?token=`, since a browser-style
//! WebSocket handshake can't always set headers (mirrors the client-side
//! URL shape built by `workspaced_transport_ssh::SshConfig::url`).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use workspaced_backend::Backend;

use crate::auth::AuthState;
use crate::ssh_server::{AuthPolicy, WorkspacedSshHandler};

const BRIDGE_BUFFER: usize = 64 * 1024;
const CHUNK: usize = 16 * 1024;

#[derive(Clone)]
pub struct SshRouteState {
    pub backend: Arc<dyn Backend>,
    pub ssh_config: Arc<russh::server::Config>,
    pub auth: AuthState,
}

#[derive(serde::Deserialize)]
pub struct SshQuery {
    token: Option<String>,
}

pub async fn ssh_upgrade(
    State(state): State<SshRouteState>,
    Query(query): Query<SshQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.auth.accepts(query.token.as_deref()) {
        return (axum::http::StatusCode::UNAUTHORIZED, "authentication failed").into_response();
    }

    ws.on_upgrade(move |socket| async move {
        if let Err(err) = drive_ssh_session(socket, state).await {
            log::warn!("/ssh session ended with error: {err}");
        }
    })
}

async fn drive_ssh_session(socket: WebSocket, state: SshRouteState) -> anyhow::Result<()> {
    let (ssh_side, bridge_side) = tokio::io::duplex(BRIDGE_BUFFER);
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (mut bridge_read, mut bridge_write) = tokio::io::split(bridge_side);

    let read_pump = tokio::spawn(async move {
        let mut buf = [0u8; CHUNK];
        loop {
            match bridge_read.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if ws_sink.send(Message::Binary(buf[..n].to_vec())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_sink.close().await;
    });

    let write_pump = tokio::spawn(async move {
        while let Some(msg) = ws_stream.next().await {
            match msg {
                Ok(Message::Binary(data)) => {
                    if bridge_write.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    let handler = WorkspacedSshHandler::new(state.backend, AuthPolicy::Open);
    russh::server::run_stream(state.ssh_config, ssh_side, handler).await?;

    read_pump.abort();
    write_pump.abort();
    Ok(())
}

/// Convenience builder, also used by `conventional_ssh.rs` to turn
/// `--ssh-users`/`--ssh-public-key`/`--ssh-authorized-keys` into the
/// credential tables `AuthPolicy::Credentialed` needs.
pub fn parse_user_password_pairs(pairs: &[String]) -> HashMap<String, String> {
    pairs
        .iter()
        .filter_map(|pair| pair.split_once(':'))
        .map(|(user, password)| (user.to_string(), password.to_string()))
        .collect()
}
