//! Value types shared across every `Backend` implementation (spec §3).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    Remote,
    Memory,
}

impl BackendKind {
    /// Name used when deriving an MCP server name, e.g. `local-filesystem`.
    pub fn mcp_server_name(self) -> &'static str {
        match self {
            BackendKind::Local => "local-filesystem",
            BackendKind::Remote => "remote-filesystem",
            BackendKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Destroyed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stat {
    pub size: u64,
    pub mode: u32,
    pub is_dir: bool,
    pub atime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Buffer,
}

#[derive(Debug, Clone)]
pub enum ExecOutput {
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    pub encoding: Encoding,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: ExecOutput,
    pub stderr: String,
    pub code: i32,
}

#[derive(Debug, Clone, Default)]
pub struct RmOptions {
    pub recursive: bool,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub stat: Stat,
}
