//! Daemon CLI flags (spec §6), laid out as a `clap`-derive struct exactly as
//! the teacher lays out every one of its binaries (`mcp-daemon::cli::Args`,
//! `ahma_mcp`'s `Cli`): one flat struct, no positional arguments, unknown
//! flags rejected by `clap`'s own parser with a nonzero exit.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use workspaced_core::config::{IsolationMode, ShellKind};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum IsolationArg {
    Auto,
    Bwrap,
    Software,
    None,
}

impl From<IsolationArg> for IsolationMode {
    fn from(value: IsolationArg) -> Self {
        match value {
            IsolationArg::Auto => IsolationMode::Auto,
            IsolationArg::Bwrap => IsolationMode::Bwrap,
            IsolationArg::Software => IsolationMode::Software,
            IsolationArg::None => IsolationMode::None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ShellArg {
    Bash,
    Sh,
    Auto,
}

impl From<ShellArg> for ShellKind {
    fn from(value: ShellArg) -> Self {
        match value {
            ShellArg::Bash => ShellKind::Bash,
            ShellArg::Sh => ShellKind::Sh,
            ShellArg::Auto => ShellKind::Auto,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "workspaced-daemon", version, about = "workspaced multiplexed daemon")]
pub struct Cli {
    /// Root directory this daemon exposes.
    #[arg(long)]
    pub root_dir: PathBuf,

    /// Port for the HTTP listener (1024-65535).
    #[arg(long, default_value_t = 3001, value_parser = clap::value_parser!(u16).range(1024..=65535))]
    pub port: u16,

    /// Bearer token required on every request/connection, if set.
    #[arg(long)]
    pub auth_token: Option<String>,

    #[arg(long, value_enum, default_value_t = IsolationArg::Auto)]
    pub isolation: IsolationArg,

    #[arg(long, value_enum, default_value_t = ShellArg::Auto)]
    pub shell: ShellArg,

    /// Sub-path this daemon instance is scoped to, relative to `root_dir`.
    /// Leading slashes are stripped; any `..` traversal is rejected.
    #[arg(long)]
    pub scope_path: Option<String>,

    /// stdio MCP only: no HTTP listener, no WebSocket route.
    #[arg(long)]
    pub local_only: bool,

    /// Disables the /ssh WebSocket-to-SSH route (the /mcp and /health
    /// routes are unaffected).
    #[arg(long)]
    pub disable_ssh_ws: bool,

    /// Path to the daemon's SSH host key, generated on first start if
    /// absent. Defaults to a path under the OS data directory.
    #[arg(long)]
    pub ssh_host_key: Option<PathBuf>,

    /// Also bind a second, conventional sshd-like listener.
    #[arg(long)]
    pub conventional_ssh: bool,

    #[arg(long, default_value_t = 2222, value_parser = clap::value_parser!(u16).range(1..=65535))]
    pub ssh_port: u16,

    /// Comma-separated `user:password` pairs accepted by the conventional
    /// SSH listener.
    #[arg(long, value_delimiter = ',')]
    pub ssh_users: Vec<String>,

    /// A single authorized public key (OpenSSH format) accepted by the
    /// conventional SSH listener.
    #[arg(long)]
    pub ssh_public_key: Option<String>,

    /// Path to an `authorized_keys`-format file accepted by the
    /// conventional SSH listener.
    #[arg(long)]
    pub ssh_authorized_keys: Option<PathBuf>,
}

impl Cli {
    /// `--scope-path` validated per spec §6: leading slashes stripped,
    /// any `..` segment rejected outright (this is an admission check at
    /// the CLI boundary, independent of the path validator's own lexical
    /// containment logic used for per-call paths).
    pub fn validated_scope_path(&self) -> Result<Option<String>, String> {
        let Some(raw) = &self.scope_path else {
            return Ok(None);
        };
        let stripped = raw.trim_start_matches('/');
        if stripped.split('/').any(|seg| seg == "..") {
            return Err(format!("--scope-path '{raw}' must not contain '..'"));
        }
        if stripped.is_empty() {
            return Ok(None);
        }
        Ok(Some(stripped.to_string()))
    }
}
