//! A thin, daemon-local adapter that recovers the compile-time
//! `ExecCapable` bound across a `ScopedBackend` wrapping a dynamic
//! `Arc<dyn Backend>` parent (spec §9: capability must be visible at the
//! type level, not probed at runtime).
//!
//! `ScopedBackend` (C8) is deliberately generic over *any* backend, so it
//! can't itself implement `ExecCapable` — doing so unconditionally would
//! advertise `exec` even when scoping a `MemoryBackend`, which spec §4.10's
//! tool table explicitly forbids. The daemon is the one place that knows,
//! at construction time, whether the backend it's about to scope was built
//! as local/remote (exec-capable) or memory (not) — so it wraps the scope
//! in this marker type only on the exec-capable branch.

use async_trait::async_trait;
use std::sync::Arc;

use workspaced_backend::{
    Backend, BackendError, BackendKind, BackendStatus, DirEntry, ExecCapable, ExecOptions,
    ExecResult, RmOptions, Stat,
};
use workspaced_scope::ScopedBackend;

pub struct ExecCapableScope(pub Arc<ScopedBackend>);

#[async_trait]
impl Backend for ExecCapableScope {
    fn kind(&self) -> BackendKind {
        self.0.kind()
    }

    fn root_dir(&self) -> String {
        self.0.root_dir()
    }

    fn status(&self) -> BackendStatus {
        self.0.status()
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        self.0.read(path).await
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), BackendError> {
        self.0.write(path, content).await
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, BackendError> {
        self.0.readdir(path).await
    }

    async fn readdir_with_stats(&self, path: &str) -> Result<Vec<DirEntry>, BackendError> {
        self.0.readdir_with_stats(path).await
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), BackendError> {
        self.0.mkdir(path, recursive).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), BackendError> {
        self.0.rename(from, to).await
    }

    async fn rm(&self, path: &str, opts: RmOptions) -> Result<(), BackendError> {
        self.0.rm(path, opts).await
    }

    async fn stat(&self, path: &str) -> Result<Stat, BackendError> {
        self.0.stat(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool, BackendError> {
        self.0.exists(path).await
    }

    async fn touch(&self, path: &str) -> Result<(), BackendError> {
        self.0.touch(path).await
    }

    async fn exec(&self, command: &str, opts: ExecOptions) -> Result<ExecResult, BackendError> {
        self.0.exec(command, opts).await
    }

    async fn destroy(&self) -> Result<(), BackendError> {
        self.0.destroy().await
    }
}

impl ExecCapable for ExecCapableScope {}
