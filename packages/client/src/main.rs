//! `workspaced`: a thin CLI over `workspaced_client`'s library surface.
//! Grounded on the teacher's `kodegen_git::main`/`kodegen_github::main`
//! shape (clap-derive subcommands, each mapping directly to one library
//! call, no business logic in the binary itself).

use std::collections::HashMap;

use clap::{Parser, Subcommand};
use workspaced_backend::types::{Encoding, ExecOptions, RmOptions};
use workspaced_core::config::{BackendConfig, IsolationMode, ShellKind};

#[derive(Parser, Debug)]
#[command(name = "workspaced", version, about = "workspaced client CLI")]
struct Cli {
    /// Backend kind to construct (local/memory/remote).
    #[arg(long, default_value = "local")]
    kind: BackendKindArg,

    /// Root directory (local) or remote-side root (remote). Ignored for memory.
    #[arg(long, default_value = ".")]
    root_dir: String,

    /// Remote daemon host (remote only).
    #[arg(long)]
    host: Option<String>,

    /// Remote daemon WebSocket-SSH port (remote only).
    #[arg(long, default_value_t = 22)]
    port: u16,

    /// Bearer/SSH-tunnel auth token (remote only).
    #[arg(long)]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum BackendKindArg {
    Local,
    Memory,
    Remote,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a file's contents to stdout.
    Read { path: String },
    /// Write stdin to a file.
    Write { path: String },
    /// List a directory's entries.
    Ls { path: String },
    /// Run a command through the backend's exec surface.
    Exec { command: String },
    /// Print a stat record.
    Stat { path: String },
    /// Create a directory.
    Mkdir {
        path: String,
        #[arg(long)]
        recursive: bool,
    },
    /// Remove a file or directory.
    Rm {
        path: String,
        #[arg(long)]
        recursive: bool,
        #[arg(long)]
        force: bool,
    },
    /// Rename/move a path.
    Mv { from: String, to: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match cli.kind {
        BackendKindArg::Local => BackendConfig::Local {
            root_dir: cli.root_dir.clone(),
            isolation: IsolationMode::Auto,
            shell: ShellKind::Auto,
            prevent_dangerous: true,
            max_output_length: 1_000_000,
        },
        BackendKindArg::Memory => BackendConfig::Memory,
        BackendKindArg::Remote => BackendConfig::Remote {
            host: cli
                .host
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--host is required for --kind remote"))?,
            port: cli.port,
            path: "/ssh".to_string(),
            auth_token: cli.auth_token.clone(),
            root_dir: cli.root_dir.clone(),
            max_retries: 3,
            prevent_dangerous: true,
        },
    };

    let client = workspaced_client::WorkspacedClient::from_config(config);
    let backend = client.backend().await?;

    match cli.command {
        Command::Read { path } => {
            let bytes = backend.read(&path).await?;
            use std::io::Write;
            std::io::stdout().write_all(&bytes)?;
        }
        Command::Write { path } => {
            use std::io::Read;
            let mut content = Vec::new();
            std::io::stdin().read_to_end(&mut content)?;
            backend.write(&path, &content).await?;
        }
        Command::Ls { path } => {
            for name in backend.readdir(&path).await? {
                println!("{name}");
            }
        }
        Command::Exec { command } => {
            let result = backend
                .exec(
                    &command,
                    ExecOptions {
                        cwd: None,
                        env: HashMap::new(),
                        timeout: None,
                        encoding: Encoding::Utf8,
                    },
                )
                .await?;
            match result.stdout {
                workspaced_backend::types::ExecOutput::Text(s) => print!("{s}"),
                workspaced_backend::types::ExecOutput::Bytes(b) => {
                    use std::io::Write;
                    std::io::stdout().write_all(&b)?;
                }
            }
            if !result.stderr.is_empty() {
                eprint!("{}", result.stderr);
            }
            if result.code != 0 {
                std::process::exit(result.code);
            }
        }
        Command::Stat { path } => {
            let stat = backend.stat(&path).await?;
            println!("{stat:?}");
        }
        Command::Mkdir { path, recursive } => {
            backend.mkdir(&path, recursive).await?;
        }
        Command::Rm {
            path,
            recursive,
            force,
        } => {
            backend.rm(&path, RmOptions { recursive, force }).await?;
        }
        Command::Mv { from, to } => {
            backend.rename(&from, &to).await?;
        }
    }

    backend.destroy().await?;
    Ok(())
}
