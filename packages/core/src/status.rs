//! Status manager (spec component C3).
//!
//! Generic over the status enum a particular backend uses, so this crate
//! doesn't need to depend on `workspaced_backend`. Listener fanout is
//! synchronous and a panicking listener never prevents the others from
//! running — mirrors the defensive callback handling in the teacher's
//! terminal/command managers, which never let one bad callback wedge the
//! whole manager.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct StatusChange<S> {
    pub from: S,
    pub to: S,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
}

type Listener<S> = Box<dyn Fn(&StatusChange<S>) + Send + Sync>;

struct Subscription<S> {
    id: u64,
    listener: Listener<S>,
}

pub struct StatusManager<S> {
    current: Mutex<S>,
    listeners: Mutex<Vec<Subscription<S>>>,
    next_id: AtomicU64,
}

/// Handle returned by [`StatusManager::subscribe`]; dropping it does
/// nothing — call [`StatusManager::unsubscribe`] explicitly (idempotent).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

impl<S> StatusManager<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: S) -> Self {
        Self {
            current: Mutex::new(initial),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> S {
        self.current.lock().clone()
    }

    /// No-op if `next == current`; otherwise records the transition and
    /// fans it out to every listener, swallowing panics so one bad listener
    /// can't starve the others.
    pub fn set_status(&self, next: S, error: Option<String>) {
        let changed = {
            let mut current = self.current.lock();
            if *current == next {
                None
            } else {
                let from = current.clone();
                *current = next.clone();
                Some(StatusChange {
                    from,
                    to: next,
                    at: Utc::now(),
                    error,
                })
            }
        };

        let Some(change) = changed else { return };

        let listeners = self.listeners.lock();
        for sub in listeners.iter() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| (sub.listener)(&change)));
            if let Err(e) = result {
                log::warn!("status listener panicked: {e:?}");
            }
        }
    }

    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> ListenerId
    where
        F: Fn(&StatusChange<S>) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push(Subscription {
            id,
            listener: Box::new(listener),
        });
        ListenerId(id)
    }

    /// Idempotent: unsubscribing an id that isn't present is a no-op.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.lock().retain(|sub| sub.id != id.0);
    }

    pub fn clear_listeners(&self) {
        self.listeners.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, PartialEq, Debug)]
    enum TestStatus {
        A,
        B,
        C,
    }

    #[test]
    fn same_status_is_noop() {
        let mgr = Arc::new(StatusManager::new(TestStatus::A));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        mgr.subscribe(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        mgr.set_status(TestStatus::A, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        mgr.set_status(TestStatus::B, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_panic_does_not_starve_others() {
        let mgr = Arc::new(StatusManager::new(TestStatus::A));
        let calls = Arc::new(AtomicUsize::new(0));
        mgr.subscribe(|_| panic!("boom"));
        let calls2 = calls.clone();
        mgr.subscribe(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        mgr.set_status(TestStatus::B, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let mgr = Arc::new(StatusManager::new(TestStatus::A));
        let id = mgr.subscribe(|_| {});
        mgr.unsubscribe(id);
        mgr.unsubscribe(id);
    }

    #[test]
    fn monotonic_destroyed_like_terminal_state() {
        let mgr = StatusManager::new(TestStatus::A);
        mgr.set_status(TestStatus::C, None);
        assert_eq!(mgr.current(), TestStatus::C);
        mgr.set_status(TestStatus::B, None);
        assert_eq!(mgr.current(), TestStatus::B);
    }
}
