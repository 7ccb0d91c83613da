//! Local-filesystem backend (spec component C4).

pub mod sandbox;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;

use workspaced_backend::{
    Backend, BackendError, BackendKind, BackendStatus, DirEntry, Encoding, ExecCapable,
    ExecOptions, ExecOutput, ExecResult, RmOptions, Stat,
};
use workspaced_core::config::IsolationMode;
use workspaced_core::path::resolve_within;
use workspaced_core::safety::{classify, Classification};
use workspaced_core::status::StatusManager;

const PROTECTED_ENV_PREFIXES: &[&str] = &["DYLD_"];
const PROTECTED_ENV_VARS: &[&str] = &["LD_PRELOAD", "LD_LIBRARY_PATH", "IFS", "BASH_ENV", "ENV"];
const TRUNCATION_MARKER: &str = "\n... [output truncated]";

pub struct LocalBackendOptions {
    pub root_dir: PathBuf,
    pub isolation: IsolationMode,
    pub shell: String,
    pub prevent_dangerous: bool,
    pub max_output_length: usize,
    pub on_dangerous: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl Default for LocalBackendOptions {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            isolation: IsolationMode::Auto,
            shell: default_shell(),
            prevent_dangerous: true,
            max_output_length: 1_000_000,
            on_dangerous: None,
        }
    }
}

fn default_shell() -> String {
    if cfg!(target_os = "windows") {
        "cmd".to_string()
    } else {
        "bash".to_string()
    }
}

pub struct LocalBackend {
    root_dir: PathBuf,
    isolation: IsolationMode,
    shell: String,
    prevent_dangerous: bool,
    max_output_length: usize,
    on_dangerous: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    status: Arc<StatusManager<BackendStatus>>,
}

impl LocalBackend {
    /// Constructs the backend, creating `root_dir` if it doesn't exist yet
    /// (per spec §4.4: "Constructors ensure `rootDir` exists").
    pub async fn new(mut opts: LocalBackendOptions) -> Result<Self, BackendError> {
        tokio::fs::create_dir_all(&opts.root_dir)
            .await
            .map_err(|source| BackendError::WriteFailed {
                path: opts.root_dir.display().to_string(),
                source,
            })?;

        opts.isolation = sandbox::resolve(opts.isolation)?;

        Ok(Self {
            root_dir: opts.root_dir,
            isolation: opts.isolation,
            shell: opts.shell,
            prevent_dangerous: opts.prevent_dangerous,
            max_output_length: opts.max_output_length,
            on_dangerous: opts.on_dangerous,
            status: Arc::new(StatusManager::new(BackendStatus::Connected)),
        })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BackendError> {
        if self.status.current() == BackendStatus::Destroyed {
            return Err(BackendError::InvalidState);
        }
        Ok(resolve_within(&self.root_dir, path)?)
    }

    fn build_env(
        &self,
        cwd: &Path,
        call_env: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.retain(|k, _| !is_protected(k));

        env.insert(
            "PATH".to_string(),
            std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
        );
        env.insert("HOME".to_string(), cwd.display().to_string());
        env.insert("TMPDIR".to_string(), cwd.join(".tmp").display().to_string());
        env.insert("LANG".to_string(), "C".to_string());
        env.insert("LC_ALL".to_string(), "C".to_string());

        for (k, v) in call_env {
            if is_protected(k) {
                log::warn!("stripped protected environment variable '{k}' from exec call");
                continue;
            }
            env.insert(k.clone(), v.clone());
        }

        env
    }

    async fn spawn(
        &self,
        command: &str,
        cwd: &Path,
        env: &HashMap<String, String>,
    ) -> Result<std::process::Output, BackendError> {
        tokio::fs::create_dir_all(cwd.join(".tmp")).await.ok();

        let mut cmd = match self.isolation {
            IsolationMode::Bwrap => {
                let cwd_in_sandbox = sandbox::path_in_sandbox(
                    &self.root_dir.display().to_string(),
                    &cwd.display().to_string(),
                );
                let args = sandbox::bwrap_args(
                    &self.root_dir.display().to_string(),
                    &cwd_in_sandbox,
                    &self.shell,
                    command,
                );
                let mut c = Command::new("bwrap");
                c.args(args);
                c
            }
            IsolationMode::Software | IsolationMode::None | IsolationMode::Auto => {
                let mut c = Command::new(&self.shell);
                c.arg("-c").arg(command).current_dir(cwd);
                c
            }
        };

        cmd.env_clear();
        cmd.envs(env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        cmd.output()
            .await
            .map_err(|source| BackendError::ExecError {
                command: command.to_string(),
                source,
            })
    }

    async fn to_stat(path: &Path) -> Result<Stat, BackendError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|source| BackendError::ReadFailed {
                path: path.display().to_string(),
                source,
            })?;
        Ok(metadata_to_stat(&meta))
    }
}

#[cfg(unix)]
fn metadata_to_stat(meta: &std::fs::Metadata) -> Stat {
    use std::os::unix::fs::MetadataExt;
    let to_dt = |secs: i64, nanos: u32| {
        DateTime::from_timestamp(secs, nanos).unwrap_or_else(Utc::now)
    };
    Stat {
        size: meta.size(),
        mode: meta.mode(),
        is_dir: meta.is_dir(),
        atime: to_dt(meta.atime(), meta.atime_nsec() as u32),
        mtime: to_dt(meta.mtime(), meta.mtime_nsec() as u32),
        ctime: to_dt(meta.ctime(), meta.ctime_nsec() as u32),
    }
}

#[cfg(not(unix))]
fn metadata_to_stat(meta: &std::fs::Metadata) -> Stat {
    let now = Utc::now();
    Stat {
        size: meta.len(),
        mode: if meta.is_dir() { 0o755 } else { 0o644 },
        is_dir: meta.is_dir(),
        atime: now,
        mtime: now,
        ctime: now,
    }
}

fn is_protected(key: &str) -> bool {
    PROTECTED_ENV_VARS.contains(&key) || PROTECTED_ENV_PREFIXES.iter().any(|p| key.starts_with(p))
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
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn root_dir(&self) -> String {
        self.root_dir.display().to_string()
    }

    fn status(&self) -> BackendStatus {
        self.status.current()
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        let p = self.resolve(path)?;
        tokio::fs::read(&p)
            .await
            .map_err(|source| BackendError::ReadFailed {
                path: p.display().to_string(),
                source,
            })
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), BackendError> {
        let p = self.resolve(path)?;
        if let Some(parent) = p.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(&p, content)
            .await
            .map_err(|source| BackendError::WriteFailed {
                path: p.display().to_string(),
                source,
            })
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let p = self.resolve(path)?;
        let mut entries = tokio::fs::read_dir(&p)
            .await
            .map_err(|source| BackendError::LsFailed {
                path: p.display().to_string(),
                source,
            })?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| BackendError::LsFailed {
            path: p.display().to_string(),
            source,
        })? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn readdir_with_stats(&self, path: &str) -> Result<Vec<DirEntry>, BackendError> {
        let p = self.resolve(path)?;
        let mut entries = tokio::fs::read_dir(&p)
            .await
            .map_err(|source| BackendError::LsFailed {
                path: p.display().to_string(),
                source,
            })?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| BackendError::LsFailed {
            path: p.display().to_string(),
            source,
        })? {
            let stat = Self::to_stat(&entry.path()).await?;
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                stat,
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), BackendError> {
        let p = self.resolve(path)?;
        let result = if recursive {
            tokio::fs::create_dir_all(&p).await
        } else {
            tokio::fs::create_dir(&p).await
        };
        result.map_err(|source| BackendError::WriteFailed {
            path: p.display().to_string(),
            source,
        })
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), BackendError> {
        let from_p = self.resolve(from)?;
        let to_p = self.resolve(to)?;
        tokio::fs::rename(&from_p, &to_p)
            .await
            .map_err(|source| BackendError::WriteFailed {
                path: from_p.display().to_string(),
                source,
            })
    }

    async fn rm(&self, path: &str, opts: RmOptions) -> Result<(), BackendError> {
        let p = self.resolve(path)?;
        let meta = tokio::fs::metadata(&p).await;
        let result = match meta {
            Ok(m) if m.is_dir() && opts.recursive => tokio::fs::remove_dir_all(&p).await,
            Ok(m) if m.is_dir() => tokio::fs::remove_dir(&p).await,
            Ok(_) => tokio::fs::remove_file(&p).await,
            Err(e) if opts.force && e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => Err(e),
        };
        result.map_err(|source| BackendError::WriteFailed {
            path: p.display().to_string(),
            source,
        })
    }

    async fn stat(&self, path: &str) -> Result<Stat, BackendError> {
        let p = self.resolve(path)?;
        Self::to_stat(&p).await
    }

    async fn exists(&self, path: &str) -> Result<bool, BackendError> {
        let p = self.resolve(path)?;
        Ok(tokio::fs::metadata(&p).await.is_ok())
    }

    /// POSIX `touch(1)` semantics: update mtime/atime if the file exists,
    /// otherwise create an empty file (spec §4.4 names `touch` without
    /// detailing it further — see SPEC_FULL.md §4.4).
    async fn touch(&self, path: &str) -> Result<(), BackendError> {
        let p = self.resolve(path)?;
        if tokio::fs::metadata(&p).await.is_ok() {
            let path_for_blocking = p.clone();
            tokio::task::spawn_blocking(move || {
                let now = filetime::FileTime::now();
                filetime::set_file_times(&path_for_blocking, now, now)
            })
            .await
            .map_err(|e| BackendError::WriteFailed {
                path: p.display().to_string(),
                source: std::io::Error::other(e),
            })?
            .map_err(|source| BackendError::WriteFailed {
                path: p.display().to_string(),
                source,
            })
        } else {
            if let Some(parent) = p.parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            tokio::fs::write(&p, b"")
                .await
                .map_err(|source| BackendError::WriteFailed {
                    path: p.display().to_string(),
                    source,
                })
        }
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
            Classification::Unsafe { reason } => {
                return Err(BackendError::UnsafeCommand { reason });
            }
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

        let env = self.build_env(&cwd, &opts.env);

        let run = self.spawn(command, &cwd, &env);
        let output = match opts.timeout {
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .map_err(|_| BackendError::Timeout)??,
            None => run.await?,
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            let tail: String = stderr.chars().rev().take(2000).collect::<Vec<_>>().into_iter().rev().collect();
            return Err(BackendError::ExecFailed {
                command: command.to_string(),
                stderr_tail: tail,
            });
        }

        let stdout = match opts.encoding {
            Encoding::Utf8 => {
                let text = String::from_utf8_lossy(&output.stdout).into_owned();
                ExecOutput::Text(truncate_utf8(text, self.max_output_length))
            }
            Encoding::Buffer => ExecOutput::Bytes(output.stdout),
        };

        Ok(ExecResult { stdout, stderr, code })
    }

    async fn destroy(&self) -> Result<(), BackendError> {
        self.status.set_status(BackendStatus::Destroyed, None);
        Ok(())
    }
}

impl ExecCapable for LocalBackend {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_utf8_does_not_split_a_multibyte_char() {
        // "é" is 2 bytes; put one straddling the cut point so a byte-level
        // truncate would panic.
        let s = format!("{}é{}", "a".repeat(9), "b".repeat(10));
        let truncated = truncate_utf8(s, 10);
        assert!(truncated.starts_with(&"a".repeat(9)));
        assert!(truncated.contains(TRUNCATION_MARKER.trim()));
    }

    async fn backend_in(dir: &Path) -> LocalBackend {
        LocalBackend::new(LocalBackendOptions {
            root_dir: dir.to_path_buf(),
            isolation: IsolationMode::None,
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        backend.write("a.txt", b"hello").await.unwrap();
        assert_eq!(backend.read("a.txt").await.unwrap(), b"hello");
        let listing = backend.readdir(".").await.unwrap();
        assert!(listing.contains(&"a.txt".to_string()));
    }

    #[tokio::test]
    async fn path_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let err = backend.read("../escape").await.unwrap_err();
        assert_eq!(err.tag(), "path-escape");
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let err = backend.exec("   ", ExecOptions::default()).await.unwrap_err();
        assert_eq!(err.tag(), "empty-command");
    }

    #[tokio::test]
    async fn dangerous_command_is_rejected_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let err = backend
            .exec("rm -rf /", ExecOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.tag(), "dangerous-operation");
    }

    #[tokio::test]
    async fn dangerous_command_with_callback_returns_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen2 = seen.clone();
        let backend = LocalBackend::new(LocalBackendOptions {
            root_dir: dir.path().to_path_buf(),
            isolation: IsolationMode::None,
            on_dangerous: Some(Arc::new(move |cmd| {
                *seen2.lock().unwrap() = Some(cmd.to_string());
            })),
            ..Default::default()
        })
        .await
        .unwrap();

        let result = backend.exec("rm -rf /", ExecOptions::default()).await.unwrap();
        match result.stdout {
            ExecOutput::Text(t) => assert_eq!(t, ""),
            ExecOutput::Bytes(b) => assert!(b.is_empty()),
        }
        assert_eq!(seen.lock().unwrap().as_deref(), Some("rm -rf /"));
    }

    #[tokio::test]
    async fn destroy_fails_subsequent_operations() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        backend.destroy().await.unwrap();
        let err = backend.read("a.txt").await.unwrap_err();
        assert_eq!(err.tag(), "invalid-state");
    }

    #[tokio::test]
    async fn exec_runs_and_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let result = backend
            .exec("echo hello", ExecOptions::default())
            .await
            .unwrap();
        match result.stdout {
            ExecOutput::Text(t) => assert_eq!(t, "hello"),
            ExecOutput::Bytes(_) => panic!("expected text output"),
        }
        assert_eq!(result.code, 0);
    }
}
