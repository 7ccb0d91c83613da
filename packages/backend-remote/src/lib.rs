//! Remote-filesystem backend (spec component C7): the same `Backend`
//! surface as the local backend, realized over SFTP for file operations
//! and exec-wrapped `cd`/env for shell semantics, with the reconnection
//! state machine from spec.md §4.7.

mod sftp_ops;

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use workspaced_backend::{
    Backend, BackendError, BackendKind, BackendStatus, DirEntry, Encoding, ExecCapable,
    ExecOptions, ExecOutput, ExecResult, RmOptions, Stat,
};
use workspaced_core::path::resolve_within;
use workspaced_core::safety::{classify, Classification};
use workspaced_core::status::StatusManager;
use workspaced_transport_ssh::{SshConfig, SshTransport, TransportError};

const PROTECTED_ENV_PREFIXES: &[&str] = &["DYLD_"];
const PROTECTED_ENV_VARS: &[&str] = &["LD_PRELOAD", "LD_LIBRARY_PATH", "IFS", "BASH_ENV", "ENV"];
const TRUNCATION_MARKER: &str = "\n... [output truncated]";

pub struct RemoteBackendOptions {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub auth_token: Option<String>,
    pub root_dir: String,
    /// `0` = infinite retries (spec §4.7).
    pub max_retries: u32,
    pub prevent_dangerous: bool,
    pub on_dangerous: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub operation_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_multiplier: f64,
    pub backoff_max: Duration,
    pub max_output_length: usize,
}

impl Default for RemoteBackendOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22,
            path: "/ssh".to_string(),
            auth_token: None,
            root_dir: "/".to_string(),
            max_retries: 3,
            prevent_dangerous: true,
            on_dangerous: None,
            operation_timeout: workspaced_core::config::default_operation_timeout(),
            backoff_initial: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            backoff_max: Duration::from_secs(30),
            max_output_length: 1_000_000,
        }
    }
}

pub struct RemoteBackend {
    transport: Arc<SshTransport>,
    status: Arc<StatusManager<BackendStatus>>,
    root_dir: String,
    max_retries: u32,
    prevent_dangerous: bool,
    on_dangerous: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    operation_timeout: Duration,
    backoff_initial: Duration,
    backoff_multiplier: f64,
    backoff_max: Duration,
    max_output_length: usize,
}

impl RemoteBackend {
    /// Construction never connects (spec §4.7: "Connection is lazy; the
    /// first method call triggers `transport.connect()`").
    pub fn new(opts: RemoteBackendOptions) -> Self {
        let mut config = SshConfig::new(opts.host, opts.port);
        config.path = opts.path;
        config.auth_token = opts.auth_token;

        Self {
            transport: Arc::new(SshTransport::new(config)),
            status: Arc::new(StatusManager::new(BackendStatus::Disconnected)),
            root_dir: opts.root_dir,
            max_retries: opts.max_retries,
            prevent_dangerous: opts.prevent_dangerous,
            on_dangerous: opts.on_dangerous,
            operation_timeout: opts.operation_timeout,
            backoff_initial: opts.backoff_initial,
            backoff_multiplier: opts.backoff_multiplier,
            backoff_max: opts.backoff_max,
            max_output_length: opts.max_output_length,
        }
    }

    /// Every path argument is validated against `rootDir`; an
    /// absolute-looking path is interpreted as relative to it (spec §4.7's
    /// lenient model — `resolve_within` already strips leading slashes).
    fn resolve(&self, path: &str) -> Result<String, BackendError> {
        if self.status.current() == BackendStatus::Destroyed {
            return Err(BackendError::InvalidState);
        }
        let resolved = resolve_within(Path::new(&self.root_dir), path)?;
        Ok(resolved.to_string_lossy().into_owned())
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let millis = (self.backoff_initial.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.backoff_max)
    }

    async fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.transport.status() == workspaced_transport_ssh::TransportStatus::Connected {
            return Ok(());
        }
        self.status.set_status(BackendStatus::Connecting, None);
        self.transport.connect().await?;
        self.status.set_status(BackendStatus::Connected, None);
        Ok(())
    }

    async fn reconnect_with_backoff(&self) -> Result<(), TransportError> {
        self.status.set_status(BackendStatus::Reconnecting, None);
        let mut attempt: u32 = 0;
        loop {
            self.transport.disconnect().await;
            match self.transport.connect().await {
                Ok(()) => {
                    self.status.set_status(BackendStatus::Connected, None);
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if self.max_retries != 0 && attempt >= self.max_retries {
                        self.status
                            .set_status(BackendStatus::Disconnected, Some(e.to_string()));
                        return Err(TransportError::ConnectionClosed);
                    }
                    tokio::time::sleep(self.backoff_for(attempt)).await;
                }
            }
        }
    }

    /// Runs `op` against the connected transport, transparently
    /// reconnecting (with backoff, up to `max_retries`) on a transient
    /// transport failure and retrying the same operation. The whole
    /// sequence — including any reconnection — is bounded by
    /// `operation_timeout`, so a `max_retries=0` permanent drop still fails
    /// *timeout* rather than retrying forever (spec §4.7, scenario S6).
    async fn run<F, Fut, T>(&self, op: F) -> Result<T, TransportError>
    where
        F: Fn(Arc<SshTransport>) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        if self.status.current() == BackendStatus::Destroyed {
            return Err(TransportError::InvalidState);
        }

        let body = async {
            self.ensure_connected().await?;
            loop {
                match op(self.transport.clone()).await {
                    Ok(value) => return Ok(value),
                    Err(e) if is_connection_error(&e) => {
                        self.reconnect_with_backoff().await?;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        match tokio::time::timeout(self.operation_timeout, body).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

fn is_connection_error(e: &TransportError) -> bool {
    matches!(
        e,
        TransportError::WebSocket(_) | TransportError::Ssh(_) | TransportError::ConnectionClosed
    )
}

fn generic_transport_err(e: TransportError) -> BackendError {
    match e {
        TransportError::WebSocket(_) | TransportError::Ssh(_) | TransportError::ConnectionClosed => {
            BackendError::ConnectionClosed
        }
        TransportError::AuthFailed => BackendError::AuthFailed,
        TransportError::Timeout => BackendError::Timeout,
        TransportError::InvalidState => BackendError::InvalidState,
        TransportError::Sftp(msg) => BackendError::ReadFailed {
            path: String::new(),
            source: std::io::Error::other(msg),
        },
    }
}

/// Maps a failed SFTP op to its path-and-tag-specific `BackendError`,
/// falling back to the generic transport mapping for non-SFTP causes.
fn map_io(path: &str, e: TransportError, wrap: impl FnOnce(String, std::io::Error) -> BackendError) -> BackendError {
    match e {
        TransportError::Sftp(msg) => wrap(path.to_string(), std::io::Error::other(msg)),
        other => generic_transport_err(other),
    }
}

fn is_protected(key: &str) -> bool {
    PROTECTED_ENV_VARS.contains(&key) || PROTECTED_ENV_PREFIXES.iter().any(|p| key.starts_with(p))
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// `HOME='<cwd>' [VAR='val' …] cd "<cwd>" && <command>` (spec §4.7): this
/// is how custom env and working-directory semantics are enforced without
/// SFTP-level cwd.
fn wrap_exec(cwd: &str, env: &HashMap<String, String>, command: &str) -> String {
    let mut prefix = format!("HOME={} ", shell_quote(cwd));
    for (k, v) in env {
        if is_protected(k) {
            log::warn!("stripped protected environment variable '{k}' from remote exec call");
            continue;
        }
        prefix.push_str(&format!("{k}={} ", shell_quote(v)));
    }
    format!("{prefix}cd {} && {command}", shell_quote(cwd))
}

fn truncate_utf8(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut boundary = max_len;
        while !s.is_char_boundary(boundary) {
            boundary -= 1;
        }
        s.truncate(boundary);
        s.push_str(TRUNCATION_MARKER);
    }
    s.trim().to_string()
}

#[async_trait]
impl Backend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn root_dir(&self) -> String {
        self.root_dir.clone()
    }

    fn status(&self) -> BackendStatus {
        self.status.current()
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        let resolved = self.resolve(path)?;
        self.run(move |t| {
            let resolved = resolved.clone();
            async move {
                let sftp = t.get_sftp().await?;
                sftp_ops::read(&sftp, &resolved).await
            }
        })
        .await
        .map_err(|e| map_io(path, e, |path, source| BackendError::ReadFailed { path, source }))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), BackendError> {
        let resolved = self.resolve(path)?;
        let content = content.to_vec();
        self.run(move |t| {
            let resolved = resolved.clone();
            let content = content.clone();
            async move {
                let sftp = t.get_sftp().await?;
                sftp_ops::write(&sftp, &resolved, &content).await
            }
        })
        .await
        .map_err(|e| map_io(path, e, |path, source| BackendError::WriteFailed { path, source }))
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let resolved = self.resolve(path)?;
        self.run(move |t| {
            let resolved = resolved.clone();
            async move {
                let sftp = t.get_sftp().await?;
                sftp_ops::readdir(&sftp, &resolved).await
            }
        })
        .await
        .map_err(|e| map_io(path, e, |path, source| BackendError::LsFailed { path, source }))
    }

    async fn readdir_with_stats(&self, path: &str) -> Result<Vec<DirEntry>, BackendError> {
        let resolved = self.resolve(path)?;
        let entries = self
            .run(move |t| {
                let resolved = resolved.clone();
                async move {
                    let sftp = t.get_sftp().await?;
                    sftp_ops::readdir_with_stats(&sftp, &resolved).await
                }
            })
            .await
            .map_err(|e| map_io(path, e, |path, source| BackendError::LsFailed { path, source }))?;
        Ok(entries.into_iter().map(|(name, stat)| DirEntry { name, stat }).collect())
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), BackendError> {
        let resolved = self.resolve(path)?;
        self.run(move |t| {
            let resolved = resolved.clone();
            async move {
                let sftp = t.get_sftp().await?;
                sftp_ops::mkdir(&sftp, &resolved, recursive).await
            }
        })
        .await
        .map_err(|e| map_io(path, e, |path, source| BackendError::WriteFailed { path, source }))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), BackendError> {
        let resolved_from = self.resolve(from)?;
        let resolved_to = self.resolve(to)?;
        self.run(move |t| {
            let resolved_from = resolved_from.clone();
            let resolved_to = resolved_to.clone();
            async move {
                let sftp = t.get_sftp().await?;
                sftp_ops::rename(&sftp, &resolved_from, &resolved_to).await
            }
        })
        .await
        .map_err(|e| map_io(from, e, |path, source| BackendError::WriteFailed { path, source }))
    }

    async fn rm(&self, path: &str, opts: RmOptions) -> Result<(), BackendError> {
        let resolved = self.resolve(path)?;
        self.run(move |t| {
            let resolved = resolved.clone();
            async move {
                let sftp = t.get_sftp().await?;
                sftp_ops::rm(&sftp, &resolved, opts.recursive, opts.force).await
            }
        })
        .await
        .map_err(|e| map_io(path, e, |path, source| BackendError::WriteFailed { path, source }))
    }

    async fn stat(&self, path: &str) -> Result<Stat, BackendError> {
        let resolved = self.resolve(path)?;
        self.run(move |t| {
            let resolved = resolved.clone();
            async move {
                let sftp = t.get_sftp().await?;
                sftp_ops::metadata(&sftp, &resolved).await
            }
        })
        .await
        .map_err(|e| map_io(path, e, |path, source| BackendError::ReadFailed { path, source }))
    }

    async fn exists(&self, path: &str) -> Result<bool, BackendError> {
        let resolved = self.resolve(path)?;
        self.run(move |t| {
            let resolved = resolved.clone();
            async move {
                let sftp = t.get_sftp().await?;
                Ok(sftp_ops::exists(&sftp, &resolved).await)
            }
        })
        .await
        .map_err(generic_transport_err)
    }

    async fn touch(&self, path: &str) -> Result<(), BackendError> {
        let resolved = self.resolve(path)?;
        let command = format!("touch {}", shell_quote(&resolved));
        let outcome = self
            .run(move |t| {
                let command = command.clone();
                async move { t.exec(&command, None).await }
            })
            .await
            .map_err(generic_transport_err)?;
        if outcome.code != 0 {
            return Err(BackendError::WriteFailed {
                path: resolved,
                source: std::io::Error::other(outcome.stderr),
            });
        }
        Ok(())
    }

    async fn exec(&self, command: &str, opts: ExecOptions) -> Result<ExecResult, BackendError> {
        if self.status.current() == BackendStatus::Destroyed {
            return Err(BackendError::InvalidState);
        }
        if command.trim().is_empty() {
            return Err(BackendError::EmptyCommand);
        }

        let cwd = match &opts.cwd {
            Some(c) => self.resolve(c)?,
            None => self.root_dir.clone(),
        };

        match classify(command) {
            Classification::Unsafe { reason } => return Err(BackendError::UnsafeCommand { reason }),
            Classification::Dangerous { reason } => {
                if self.prevent_dangerous {
                    if let Some(cb) = &self.on_dangerous {
                        cb(command);
                        return Ok(ExecResult {
                            stdout: match opts.encoding {
                                Encoding::Utf8 => ExecOutput::Text(String::new()),
                                Encoding::Buffer => ExecOutput::Bytes(Vec::new()),
                            },
                            stderr: String::new(),
                            code: 0,
                        });
                    }
                    return Err(BackendError::DangerousOperation { reason });
                }
            }
            Classification::Ok => {}
        }

        let wrapped = wrap_exec(&cwd, &opts.env, command);
        let call_timeout = opts.timeout;

        let outcome = self
            .run(move |t| {
                let wrapped = wrapped.clone();
                async move { t.exec(&wrapped, call_timeout).await }
            })
            .await
            .map_err(generic_transport_err)?;

        if outcome.code != 0 {
            let tail: String = outcome
                .stderr
                .chars()
                .rev()
                .take(2000)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return Err(BackendError::ExecFailed {
                command: command.to_string(),
                stderr_tail: tail,
            });
        }

        let stdout = match opts.encoding {
            Encoding::Utf8 => ExecOutput::Text(truncate_utf8(outcome.stdout, self.max_output_length)),
            Encoding::Buffer => ExecOutput::Bytes(outcome.stdout.into_bytes()),
        };

        Ok(ExecResult { stdout, stderr: outcome.stderr, code: outcome.code })
    }

    async fn destroy(&self) -> Result<(), BackendError> {
        self.transport.destroy().await;
        self.status.set_status(BackendStatus::Destroyed, None);
        Ok(())
    }
}

impl ExecCapable for RemoteBackend {}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RemoteBackend {
        RemoteBackend::new(RemoteBackendOptions {
            root_dir: "/home/build/workspace".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn wrap_exec_sets_home_and_cwd() {
        let mut env = HashMap::new();
        env.insert("FOO".to_string(), "bar".to_string());
        let wrapped = wrap_exec("/home/build/workspace", &env, "ls -la");
        assert!(wrapped.contains("HOME='/home/build/workspace'"));
        assert!(wrapped.contains("FOO='bar'"));
        assert!(wrapped.ends_with("cd '/home/build/workspace' && ls -la"));
    }

    #[test]
    fn wrap_exec_strips_protected_vars() {
        let mut env = HashMap::new();
        env.insert("LD_PRELOAD".to_string(), "evil.so".to_string());
        let wrapped = wrap_exec("/root", &env, "id");
        assert!(!wrapped.contains("LD_PRELOAD"));
    }

    #[test]
    fn path_escape_is_rejected_before_any_transport_use() {
        let backend = backend();
        let err = backend.resolve("../escape").unwrap_err();
        assert_eq!(err.tag(), "path-escape");
    }

    #[test]
    fn absolute_looking_path_is_relative_to_root() {
        let backend = backend();
        let resolved = backend.resolve("/etc/passwd").unwrap();
        assert_eq!(resolved, "/home/build/workspace/etc/passwd");
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let backend = backend();
        assert_eq!(backend.backoff_for(1), Duration::from_millis(1000));
        assert_eq!(backend.backoff_for(2), Duration::from_millis(2000));
        assert!(backend.backoff_for(20) <= backend.backoff_max);
    }

    #[test]
    fn destroy_marks_invalid_state_for_further_resolve_calls() {
        let backend = backend();
        backend.status.set_status(BackendStatus::Destroyed, None);
        let err = backend.resolve("a.txt").unwrap_err();
        assert_eq!(err.tag(), "invalid-state");
    }
}
