//! In-memory key/value backend (spec component C5).
//!
//! Keys are opaque strings; `/` is the hierarchy separator used only by
//! `readdir`/`readdir_with_stats`/`listScopes`/recursive `rm`. Backed by
//! `dashmap::DashMap` so concurrent writers to distinct keys don't contend
//! on a single lock — the same crate the teacher reaches for in its session
//! mapper and connection-pool warmup path.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use workspaced_backend::{
    Backend, BackendError, BackendKind, BackendStatus, DirEntry, ExecOptions, ExecResult,
    RmOptions, Stat,
};
use workspaced_core::status::StatusManager;

pub struct MemoryBackend {
    store: DashMap<String, Vec<u8>>,
    status: Arc<StatusManager<BackendStatus>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
            status: Arc::new(StatusManager::new(BackendStatus::Connected)),
        }
    }

    fn check_alive(&self) -> Result<(), BackendError> {
        if self.status.current() == BackendStatus::Destroyed {
            Err(BackendError::InvalidState)
        } else {
            Ok(())
        }
    }

    fn normalize_prefix(path: &str) -> String {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        }
    }

    fn first_segments(&self, prefix: &str) -> Vec<String> {
        let mut segments = BTreeSet::new();
        for entry in self.store.iter() {
            let key = entry.key();
            if let Some(rest) = key.strip_prefix(prefix) {
                if rest.is_empty() {
                    continue;
                }
                let first = rest.split('/').next().unwrap_or(rest);
                segments.insert(first.to_string());
            }
        }
        segments.into_iter().collect()
    }

    fn value_stat(value: &[u8]) -> Stat {
        let now = Utc::now();
        Stat {
            size: value.len() as u64,
            mode: 0o644,
            is_dir: false,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    fn implicit_dir_stat() -> Stat {
        let now = Utc::now();
        Stat {
            size: 0,
            mode: 0o755,
            is_dir: true,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn root_dir(&self) -> String {
        String::new()
    }

    fn status(&self) -> BackendStatus {
        self.status.current()
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        self.check_alive()?;
        self.store
            .get(path)
            .map(|v| v.clone())
            .ok_or_else(|| BackendError::KeyNotFound {
                key: path.to_string(),
            })
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), BackendError> {
        self.check_alive()?;
        self.store.insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, BackendError> {
        self.check_alive()?;
        let prefix = Self::normalize_prefix(path);
        Ok(self.first_segments(&prefix))
    }

    async fn readdir_with_stats(&self, path: &str) -> Result<Vec<DirEntry>, BackendError> {
        self.check_alive()?;
        let prefix = Self::normalize_prefix(path);
        let names = self.first_segments(&prefix);
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let full_key = format!("{prefix}{name}");
            let stat = match self.store.get(&full_key) {
                Some(v) => Self::value_stat(&v),
                None => Self::implicit_dir_stat(),
            };
            out.push(DirEntry { name, stat });
        }
        Ok(out)
    }

    /// Directories are implicit in the key space, so creating one is a
    /// no-op success (spec §4.5).
    async fn mkdir(&self, _path: &str, _recursive: bool) -> Result<(), BackendError> {
        self.check_alive()?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), BackendError> {
        self.check_alive()?;
        let value = self
            .store
            .get(from)
            .map(|v| v.clone())
            .ok_or_else(|| BackendError::KeyNotFound {
                key: from.to_string(),
            })?;
        self.store.insert(to.to_string(), value);
        self.store.remove(from);
        Ok(())
    }

    async fn rm(&self, path: &str, opts: RmOptions) -> Result<(), BackendError> {
        self.check_alive()?;
        if opts.recursive {
            let prefix = format!("{path}/");
            let existed = self.store.remove(path).is_some();
            let mut any_removed = existed;
            self.store.retain(|k, _| {
                let matches = k.starts_with(&prefix);
                if matches {
                    any_removed = true;
                }
                !matches
            });
            if !any_removed && !opts.force {
                return Err(BackendError::KeyNotFound {
                    key: path.to_string(),
                });
            }
            Ok(())
        } else if self.store.remove(path).is_some() {
            Ok(())
        } else if opts.force {
            Ok(())
        } else {
            Err(BackendError::KeyNotFound {
                key: path.to_string(),
            })
        }
    }

    async fn stat(&self, path: &str) -> Result<Stat, BackendError> {
        self.check_alive()?;
        self.store
            .get(path)
            .map(|v| Self::value_stat(&v))
            .ok_or_else(|| BackendError::KeyNotFound {
                key: path.to_string(),
            })
    }

    async fn exists(&self, path: &str) -> Result<bool, BackendError> {
        self.check_alive()?;
        Ok(self.store.contains_key(path))
    }

    async fn touch(&self, path: &str) -> Result<(), BackendError> {
        self.check_alive()?;
        self.store.entry(path.to_string()).or_insert_with(Vec::new);
        Ok(())
    }

    async fn exec(&self, _command: &str, _opts: ExecOptions) -> Result<ExecResult, BackendError> {
        Err(BackendError::NotImplemented {
            operation: "exec".to_string(),
        })
    }

    async fn destroy(&self) -> Result<(), BackendError> {
        self.status.set_status(BackendStatus::Destroyed, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.write("a/b", b"1").await.unwrap();
        backend.write("a/c/d", b"2").await.unwrap();
        backend.write("a/c/e", b"3").await.unwrap();
        backend.write("f", b"4").await.unwrap();
        backend
    }

    #[tokio::test]
    async fn readdir_correctness_matches_spec_example() {
        let backend = seeded().await;
        assert_eq!(backend.readdir("a").await.unwrap(), vec!["b", "c"]);
        assert_eq!(backend.readdir("a/c").await.unwrap(), vec!["d", "e"]);
        assert_eq!(backend.readdir("").await.unwrap(), vec!["a", "f"]);
    }

    #[tokio::test]
    async fn exec_is_not_implemented() {
        let backend = MemoryBackend::new();
        let err = backend
            .exec("echo hi", ExecOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.tag(), "not-implemented");
    }

    #[tokio::test]
    async fn rm_non_recursive_deletes_exact_key_only() {
        let backend = seeded().await;
        backend.rm("a/c", RmOptions::default()).await.unwrap_or(());
        // "a/c" is not itself a key (only a/c/d, a/c/e are); sub-keys survive.
        assert!(backend.exists("a/c/d").await.unwrap());
    }

    #[tokio::test]
    async fn rm_recursive_deletes_prefix() {
        let backend = seeded().await;
        backend
            .rm("a/c", RmOptions { recursive: true, force: false })
            .await
            .unwrap();
        assert!(!backend.exists("a/c/d").await.unwrap());
        assert!(!backend.exists("a/c/e").await.unwrap());
        assert!(backend.exists("a/b").await.unwrap());
    }

    #[tokio::test]
    async fn rename_is_copy_then_delete() {
        let backend = seeded().await;
        backend.rename("f", "g").await.unwrap();
        assert!(!backend.exists("f").await.unwrap());
        assert_eq!(backend.read("g").await.unwrap(), b"4");
    }

    #[tokio::test]
    async fn stat_synthesizes_fixed_mode() {
        let backend = seeded().await;
        let stat = backend.stat("a/b").await.unwrap();
        assert_eq!(stat.mode, 0o644);
        assert_eq!(stat.size, 1);
    }

    #[tokio::test]
    async fn destroy_is_terminal() {
        let backend = MemoryBackend::new();
        backend.destroy().await.unwrap();
        let err = backend.read("x").await.unwrap_err();
        assert_eq!(err.tag(), "invalid-state");
    }
}
