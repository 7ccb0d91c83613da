//! Transport configuration (spec §4.6).

use std::time::Duration;

use workspaced_core::config::{default_exec_timeout, default_keepalive_interval};

/// How many missed keepalives the SSH layer tolerates before giving up on
/// the connection (spec §4.6: `keepaliveCountMax=3`).
pub const KEEPALIVE_COUNT_MAX: u32 = 3;

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub auth_token: Option<String>,
    pub connect_timeout: Duration,
    pub exec_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl SshConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: "/ssh".to_string(),
            auth_token: None,
            connect_timeout: Duration::from_secs(30),
            exec_timeout: default_exec_timeout(),
            keepalive_interval: default_keepalive_interval(),
        }
    }

    /// `ws[s]://host:port<path>?token=<authToken>` (spec §4.6).
    pub fn url(&self) -> String {
        match &self.auth_token {
            Some(token) => format!(
                "ws://{}:{}{}?token={}",
                self.host, self.port, self.path, token
            ),
            None => format!("ws://{}:{}{}", self.host, self.port, self.path),
        }
    }
}
