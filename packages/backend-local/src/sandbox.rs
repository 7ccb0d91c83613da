//! Isolation-mode resolution and `bwrap` argument construction (spec §4.4).
//!
//! Grounded on the general shape of `paulirotta-ahma_mcp/ahma_core/src/sandbox.rs`
//! (capability probing via `which`, an explicit fallback chain) though the
//! actual bwrap recipe here follows spec.md §4.4 literally, since that
//! reference targets macOS/Landlock rather than this spec's Linux bwrap.

use workspaced_core::config::IsolationMode;
use workspaced_backend::BackendError;

const SYSTEM_RO_BINDS: &[&str] = &["/usr", "/lib", "/lib64", "/bin", "/sbin"];
const SANDBOX_MOUNT_POINT: &str = "/workspace";

/// Resolve `auto` against `PATH`, and fail construction if `bwrap` was
/// requested explicitly but isn't installed.
pub fn resolve(requested: IsolationMode) -> Result<IsolationMode, BackendError> {
    match requested {
        IsolationMode::Auto => {
            if which::which("bwrap").is_ok() {
                Ok(IsolationMode::Bwrap)
            } else {
                Ok(IsolationMode::Software)
            }
        }
        IsolationMode::Bwrap => {
            if which::which("bwrap").is_ok() {
                Ok(IsolationMode::Bwrap)
            } else {
                Err(BackendError::MissingUtilities {
                    utility: "bwrap".to_string(),
                })
            }
        }
        other => Ok(other),
    }
}

/// Build the `bwrap ... -- shell -c "$command"` argv for a sandboxed exec.
/// `root_dir` is bind-mounted read-write at [`SANDBOX_MOUNT_POINT`] and
/// becomes the sandboxed process's cwd (adjusted for any `cwd` the caller
/// resolved beneath it).
pub fn bwrap_args(root_dir: &str, cwd_in_sandbox: &str, shell: &str, command: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    for dir in SYSTEM_RO_BINDS {
        args.push("--ro-bind".to_string());
        args.push((*dir).to_string());
        args.push((*dir).to_string());
    }

    args.push("--bind".to_string());
    args.push(root_dir.to_string());
    args.push(SANDBOX_MOUNT_POINT.to_string());

    args.push("--chdir".to_string());
    args.push(cwd_in_sandbox.to_string());

    args.push("--dev".to_string());
    args.push("/dev".to_string());
    args.push("--proc".to_string());
    args.push("/proc".to_string());
    args.push("--tmpfs".to_string());
    args.push("/tmp".to_string());

    args.push("--unshare-all".to_string());
    args.push("--share-net".to_string());
    args.push("--die-with-parent".to_string());

    args.push(shell.to_string());
    args.push("-c".to_string());
    args.push(command.to_string());

    args
}

/// Map an absolute path beneath `root_dir` to its location inside the
/// sandbox's fixed mount point.
pub fn path_in_sandbox(root_dir: &str, absolute_path: &str) -> String {
    match absolute_path.strip_prefix(root_dir) {
        Some(rest) => format!("{SANDBOX_MOUNT_POINT}{rest}"),
        None => SANDBOX_MOUNT_POINT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_path_mapping() {
        assert_eq!(
            path_in_sandbox("/root/ws", "/root/ws/sub/file.txt"),
            "/workspace/sub/file.txt"
        );
        assert_eq!(path_in_sandbox("/root/ws", "/root/ws"), "/workspace");
    }

    #[test]
    fn bwrap_args_include_required_flags() {
        let args = bwrap_args("/root/ws", "/workspace", "bash", "echo hi");
        assert!(args.contains(&"--unshare-all".to_string()));
        assert!(args.contains(&"--die-with-parent".to_string()));
        assert!(args.contains(&"/workspace".to_string()));
        assert!(args.iter().any(|a| a == "echo hi"));
    }
}
