use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use tokio::sync::Mutex;
use tokio::time::timeout;

use workspaced_core::status::StatusManager;

use crate::bridge::IoBridge;
use crate::config::{SshConfig, KEEPALIVE_COUNT_MAX};
use crate::error::TransportError;
use crate::handler::DummyClientHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Disconnected,
    Connecting,
    Connected,
    Destroyed,
}

pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

struct Connected {
    handle: Handle<DummyClientHandler>,
    bridge: IoBridge,
    sftp: Option<Arc<SftpSession>>,
}

/// WebSocket-SSH client transport (spec §4.6). One instance per remote
/// connection; `exec`/`execStream`/`getSFTP` all require [`connect`] to have
/// completed, and become *connection-closed* once [`disconnect`] runs.
pub struct SshTransport {
    config: SshConfig,
    status: Arc<StatusManager<TransportStatus>>,
    inner: Mutex<Option<Connected>>,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            status: Arc::new(StatusManager::new(TransportStatus::Disconnected)),
            inner: Mutex::new(None),
        }
    }

    pub fn status(&self) -> TransportStatus {
        self.status.current()
    }

    pub fn status_manager(&self) -> Arc<StatusManager<TransportStatus>> {
        self.status.clone()
    }

    /// Opens the WebSocket, splices it into an SSH client session
    /// authenticated with dummy credentials, and waits for SSH readiness.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        self.status.set_status(TransportStatus::Connecting, None);

        let url = self.config.url();
        let connected = timeout(self.config.connect_timeout, async {
            let (ws, _response) = tokio_tungstenite::connect_async(&url)
                .await
                .map_err(|e| TransportError::WebSocket(e.to_string()))?;
            let bridge = IoBridge::spawn(ws);

            let mut client_config = client::Config::default();
            client_config.keepalive_interval = Some(self.config.keepalive_interval);
            client_config.keepalive_max = KEEPALIVE_COUNT_MAX as usize;

            let handle = client::connect_stream(
                Arc::new(client_config),
                bridge.ssh_side,
                DummyClientHandler,
            )
            .await
            .map_err(|e| TransportError::Ssh(e.to_string()))?;

            Ok::<_, TransportError>((handle, bridge))
        })
        .await
        .map_err(|_| TransportError::Timeout)??;

        let (mut handle, bridge) = connected;

        let authenticated = handle
            .authenticate_password("workspaced", "workspaced")
            .await
            .map_err(|e| TransportError::Ssh(e.to_string()))?;
        if !authenticated {
            bridge.abort();
            self.status.set_status(TransportStatus::Disconnected, None);
            return Err(TransportError::AuthFailed);
        }

        *guard = Some(Connected {
            handle,
            bridge,
            sftp: None,
        });
        drop(guard);

        self.status.set_status(TransportStatus::Connected, None);
        Ok(())
    }

    /// Runs `command` over a fresh SSH channel; resolves with buffered
    /// stdout/stderr and the exit code, or *timeout* past `timeout`
    /// (default the transport's configured `exec_timeout`, spec default
    /// 120s).
    pub async fn exec(
        &self,
        command: &str,
        call_timeout: Option<Duration>,
    ) -> Result<ExecOutcome, TransportError> {
        let mut stdout = String::new();
        let mut stderr = String::new();
        self.exec_stream(
            command,
            call_timeout,
            |chunk| stdout.push_str(chunk),
            |chunk| stderr.push_str(chunk),
        )
        .await
        .map(|code| ExecOutcome { stdout: stdout.clone(), stderr: stderr.clone(), code })
    }

    /// Identical to [`exec`] but pushes output chunks to the callbacks as
    /// they arrive, resolving with just the exit code.
    pub async fn exec_stream<FOut, FErr>(
        &self,
        command: &str,
        call_timeout: Option<Duration>,
        mut on_stdout: FOut,
        mut on_stderr: FErr,
    ) -> Result<i32, TransportError>
    where
        FOut: FnMut(&str),
        FErr: FnMut(&str),
    {
        let guard = self.inner.lock().await;
        let connected = guard.as_ref().ok_or(TransportError::InvalidState)?;

        let mut channel = connected
            .handle
            .channel_open_session()
            .await
            .map_err(|e| TransportError::Ssh(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| TransportError::Ssh(e.to_string()))?;

        let deadline = call_timeout.unwrap_or(self.config.exec_timeout);
        let mut code = 0i32;

        let run = async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => {
                        on_stdout(&String::from_utf8_lossy(&data));
                    }
                    Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                        on_stderr(&String::from_utf8_lossy(&data));
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        code = exit_status as i32;
                    }
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => break,
                    Some(_) => {}
                    None => break,
                }
            }
            Ok::<(), TransportError>(())
        };

        timeout(deadline, run)
            .await
            .map_err(|_| TransportError::Timeout)??;

        Ok(code)
    }

    /// Returns the shared SFTP session, opening it on first call. The
    /// connected-session guard is held for the `DashMap`-like liveness
    /// check only; the returned handle can be used concurrently by
    /// multiple callers (`russh-sftp` itself single-flights requests).
    pub async fn get_sftp(&self) -> Result<Arc<SftpSession>, TransportError> {
        let mut guard = self.inner.lock().await;
        let connected = guard.as_mut().ok_or(TransportError::InvalidState)?;

        if let Some(sftp) = &connected.sftp {
            return Ok(sftp.clone());
        }

        let mut channel = connected
            .handle
            .channel_open_session()
            .await
            .map_err(|e| TransportError::Ssh(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| TransportError::Ssh(e.to_string()))?;

        let session = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| TransportError::Sftp(e.to_string()))?;
        let session = Arc::new(session);
        connected.sftp = Some(session.clone());
        Ok(session)
    }

    /// Drops the cached SFTP session so the next [`get_sftp`] call reopens
    /// it. Called by the remote backend when an SFTP request reports the
    /// session closed.
    pub async fn invalidate_sftp(&self) {
        if let Some(connected) = self.inner.lock().await.as_mut() {
            connected.sftp = None;
        }
    }

    /// Closes SFTP, then SSH, then the WebSocket; idempotent.
    pub async fn disconnect(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(connected) = guard.take() {
            drop(connected.sftp);
            let _ = connected
                .handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await;
            connected.bridge.abort();
        }
        self.status.set_status(TransportStatus::Disconnected, None);
    }

    pub async fn destroy(&self) {
        self.disconnect().await;
        self.status.set_status(TransportStatus::Destroyed, None);
    }
}
