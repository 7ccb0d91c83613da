//! Shared backend configuration (ambient stack — see SPEC_FULL.md §6).
//!
//! Mirrors the teacher's `ServiceConfig`/`SseServerConfig` shape: a plain
//! `serde`-deserializable struct with `#[serde(default = "fn")]` constants,
//! no implicit global singleton. The daemon and client entry points both
//! build one of these from CLI flags or a programmatic constructor and pass
//! it explicitly into backend construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Local {
        root_dir: String,
        #[serde(default)]
        isolation: IsolationMode,
        #[serde(default)]
        shell: ShellKind,
        #[serde(default = "default_true")]
        prevent_dangerous: bool,
        #[serde(default = "default_max_output")]
        max_output_length: usize,
    },
    Memory,
    Remote {
        host: String,
        #[serde(default = "default_ssh_port")]
        port: u16,
        #[serde(default = "default_ssh_ws_path")]
        path: String,
        #[serde(default)]
        auth_token: Option<String>,
        #[serde(default)]
        root_dir: String,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
        #[serde(default = "default_true")]
        prevent_dangerous: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    #[default]
    Auto,
    Bwrap,
    Software,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellKind {
    #[default]
    Auto,
    Bash,
    Sh,
}

fn default_true() -> bool {
    true
}
fn default_max_output() -> usize {
    1_000_000
}
fn default_ssh_port() -> u16 {
    22
}
fn default_ssh_ws_path() -> String {
    "/ssh".to_string()
}
fn default_max_retries() -> u32 {
    3
}

pub fn default_operation_timeout() -> Duration {
    Duration::from_secs(30)
}

pub fn default_exec_timeout() -> Duration {
    Duration::from_secs(120)
}

pub fn default_keepalive_interval() -> Duration {
    Duration::from_secs(30)
}
