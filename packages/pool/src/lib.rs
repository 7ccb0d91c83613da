//! Keyed connection pool (spec component C9).
//!
//! Generalizes the teacher's connection-pool warmup helper in
//! `kodegen-mcp-server`'s `router_builder.rs` (`warm up connection pool by
//! pre-establishing min_connections`) from a fixed warmup routine into a
//! general-purpose keyed pool: construct a backend once per key, serialize
//! same-key callers FIFO through a `tokio::sync::Mutex` gate, and let an
//! unkeyed call get a private, disposable backend instead.

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::Mutex as AsyncMutex;

use workspaced_backend::{Backend, BackendError};
use workspaced_core::config::BackendConfig;

/// Constructs a fresh `B` from a config. Boxed rather than generic over a
/// closure type so `Pool<B>` itself stays a plain struct callers can share
/// via `Arc` without threading a factory type parameter everywhere.
pub type BackendFactory<B> =
    Arc<dyn Fn(BackendConfig) -> BoxFuture<'static, Result<B, BackendError>> + Send + Sync>;

struct PoolEntry<B> {
    backend: Arc<B>,
    /// Purely an ordering gate — the backend itself stays reachable through
    /// the map for concurrent reads (e.g. `status()`) while this serializes
    /// same-key callback bodies.
    queue: AsyncMutex<()>,
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_backends: usize,
    pub backends_by_key: Vec<String>,
}

/// `(backendFactory, defaultConfig, entries: key -> (backend, queue))` per
/// spec §4.9. Rust's tagged-enum `BackendConfig` has no generic field-level
/// merge across its variants, so "per-request config overrides merge with
/// defaults" is realized here as: an override, when given, replaces the
/// default wholesale for that key's first construction; omitted, the
/// pool's own default is used. Either way the override only ever matters on
/// the call that actually constructs the entry (spec §4.9).
pub struct Pool<B: Backend> {
    factory: BackendFactory<B>,
    default_config: BackendConfig,
    entries: DashMap<String, Arc<PoolEntry<B>>>,
}

impl<B: Backend> Pool<B> {
    pub fn new(factory: BackendFactory<B>, default_config: BackendConfig) -> Self {
        Self {
            factory,
            default_config,
            entries: DashMap::new(),
        }
    }

    async fn construct(&self, config: Option<BackendConfig>) -> Result<Arc<B>, BackendError> {
        let cfg = config.unwrap_or_else(|| self.default_config.clone());
        Ok(Arc::new((self.factory)(cfg).await?))
    }

    /// `key = None`: a private backend is constructed, `cb` runs against it,
    /// then it is destroyed regardless of `cb`'s outcome.
    ///
    /// `key = Some(_)`: the entry for `key` is constructed on first miss
    /// (construction errors never leave a half-installed entry — the entry
    /// is only inserted after the factory succeeds) and reused afterward;
    /// concurrent callers for the same key serialize FIFO through the
    /// entry's queue.
    pub async fn with_backend<T, F, Fut>(
        &self,
        key: Option<&str>,
        config: Option<BackendConfig>,
        cb: F,
    ) -> Result<T, BackendError>
    where
        F: FnOnce(Arc<B>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let Some(key) = key else {
            let backend = self.construct(config).await?;
            let result = cb(backend.clone()).await;
            let _ = backend.destroy().await;
            return result;
        };

        let entry = match self.entries.get(key) {
            Some(existing) => existing.clone(),
            None => {
                let backend = self.construct(config).await?;
                match self.entries.entry(key.to_string()) {
                    Entry::Occupied(occupied) => {
                        // Lost the race to install: another caller's entry
                        // won, so this freshly built backend is surplus.
                        let _ = backend.destroy().await;
                        occupied.get().clone()
                    }
                    Entry::Vacant(vacant) => {
                        let entry = Arc::new(PoolEntry {
                            backend,
                            queue: AsyncMutex::new(()),
                        });
                        vacant.insert(entry.clone());
                        entry
                    }
                }
            }
        };

        let _slot = entry.queue.lock().await;
        cb(entry.backend.clone()).await
    }

    /// Destroys every entry concurrently, swallowing individual errors (a
    /// backend that fails to tear down cleanly must not block the others),
    /// then clears the map. The pool is reusable afterward.
    pub async fn destroy_all(&self) {
        let backends: Vec<Arc<B>> = self
            .entries
            .iter()
            .map(|entry| entry.value().backend.clone())
            .collect();
        futures::future::join_all(backends.iter().map(|b| async move {
            if let Err(e) = b.destroy().await {
                log::warn!("pool entry destroy failed: {e}");
            }
        }))
        .await;
        self.entries.clear();
    }

    pub fn get_stats(&self) -> PoolStats {
        PoolStats {
            total_backends: self.entries.len(),
            backends_by_key: self.entries.iter().map(|e| e.key().clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use workspaced_backend_memory::MemoryBackend;

    fn memory_factory() -> BackendFactory<MemoryBackend> {
        Arc::new(|_cfg: BackendConfig| Box::pin(async { Ok(MemoryBackend::new()) }))
    }

    #[tokio::test]
    async fn pool_sameness_for_same_key_distinct_for_different_keys() {
        let pool = Pool::new(memory_factory(), BackendConfig::Memory);

        let a1 = pool
            .with_backend(Some("k1"), None, |b| async move { Ok(Arc::as_ptr(&b) as usize) })
            .await
            .unwrap();
        let a2 = pool
            .with_backend(Some("k1"), None, |b| async move { Ok(Arc::as_ptr(&b) as usize) })
            .await
            .unwrap();
        let b1 = pool
            .with_backend(Some("k2"), None, |b| async move { Ok(Arc::as_ptr(&b) as usize) })
            .await
            .unwrap();

        assert_eq!(a1, a2);
        assert_ne!(a1, b1);
    }

    #[tokio::test]
    async fn unkeyed_calls_get_private_disposable_backends() {
        let pool = Pool::new(memory_factory(), BackendConfig::Memory);
        let p1 = pool
            .with_backend(None, None, |b| async move { Ok(Arc::as_ptr(&b) as usize) })
            .await
            .unwrap();
        let p2 = pool
            .with_backend(None, None, |b| async move { Ok(Arc::as_ptr(&b) as usize) })
            .await
            .unwrap();
        assert_ne!(p1, p2);
        assert_eq!(pool.get_stats().total_backends, 0);
    }

    #[tokio::test]
    async fn same_key_callbacks_never_run_concurrently() {
        let pool = Arc::new(Pool::new(memory_factory(), BackendConfig::Memory));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                pool.with_backend(Some("shared"), None, |_b| {
                    let concurrent = concurrent.clone();
                    let max_seen = max_seen.clone();
                    async move {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, BackendError>(())
                    }
                })
                .await
                .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn destroy_all_clears_entries_and_pool_is_reusable() {
        let pool = Pool::new(memory_factory(), BackendConfig::Memory);
        pool.with_backend(Some("k1"), None, |_b| async { Ok(()) })
            .await
            .unwrap();
        pool.with_backend(Some("k2"), None, |_b| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(pool.get_stats().total_backends, 2);

        pool.destroy_all().await;
        assert_eq!(pool.get_stats().total_backends, 0);

        pool.with_backend(Some("k1"), None, |_b| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(pool.get_stats().total_backends, 1);
    }
}
