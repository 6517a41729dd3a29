//! Per-client binary locks.
//!
//! Every driver call for a client runs while holding that client's permit.
//! HTTP requests wait a bounded time for it; the poller only ever tries.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    dashmap::DashMap,
    tokio::sync::{OwnedSemaphorePermit, Semaphore},
    tracing::{debug, trace, warn},
};

struct Holder {
    ticket: u64,
    _permit: OwnedSemaphorePermit,
}

struct ClientLock {
    semaphore: Arc<Semaphore>,
    holder: Mutex<Option<Holder>>,
    next_ticket: AtomicU64,
}

impl ClientLock {
    fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            holder: Mutex::new(None),
            next_ticket: AtomicU64::new(0),
        }
    }

    fn holder(&self) -> MutexGuard<'_, Option<Holder>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hold(&self, permit: OwnedSemaphorePermit) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed) + 1;
        *self.holder() = Some(Holder {
            ticket,
            _permit: permit,
        });
        ticket
    }

    /// Drop the held permit if it still belongs to `ticket`.
    fn release_ticket(&self, ticket: u64) -> bool {
        self.holder()
            .take_if(|holder| holder.ticket == ticket)
            .is_some()
    }

    fn release_any(&self) -> bool {
        self.holder().take().is_some()
    }
}

/// Binary semaphores keyed by client id, created on first use.
#[derive(Default)]
pub struct SemaphoreRegistry {
    locks: DashMap<String, Arc<ClientLock>>,
}

impl SemaphoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, client_id: &str) -> Arc<ClientLock> {
        Arc::clone(
            self.locks
                .entry(client_id.to_string())
                .or_insert_with(|| Arc::new(ClientLock::new()))
                .value(),
        )
    }

    /// Acquire the client's permit, waiting at most `timeout`.
    ///
    /// A zero timeout never waits. Returns `None` on timeout, for an empty
    /// client id, or when the client's lock is removed while waiting.
    pub async fn acquire(&self, client_id: &str, timeout: Duration) -> Option<ClientPermit> {
        if client_id.is_empty() {
            return None;
        }
        let lock = self.lock_for(client_id);
        let semaphore = Arc::clone(&lock.semaphore);

        let permit = if timeout.is_zero() {
            semaphore.try_acquire_owned().ok()?
        } else {
            match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => {
                    debug!(client_id, "client lock removed while waiting");
                    return None;
                },
                Err(_) => {
                    debug!(
                        client_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "client lock wait timed out"
                    );
                    return None;
                },
            }
        };

        let ticket = lock.hold(permit);
        Some(ClientPermit {
            client_id: client_id.to_string(),
            lock,
            ticket,
            released: false,
        })
    }

    /// Force-release whatever permit is held for the client.
    ///
    /// Returns `false` for an empty or unknown id, or when nothing is held.
    pub fn release(&self, client_id: &str) -> bool {
        if client_id.is_empty() {
            return false;
        }
        let Some(lock) = self.locks.get(client_id).map(|l| Arc::clone(l.value())) else {
            return false;
        };
        let released = lock.release_any();
        if released {
            warn!(client_id, "client lock force-released");
        }
        released
    }

    /// Release and discard the client's lock. Pending waiters give up.
    pub fn remove(&self, client_id: &str) -> bool {
        let Some((_, lock)) = self.locks.remove(client_id) else {
            return false;
        };
        lock.semaphore.close();
        lock.release_any();
        true
    }

    pub fn is_held(&self, client_id: &str) -> bool {
        self.locks
            .get(client_id)
            .is_some_and(|lock| lock.holder().is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// A held client permit. Released on [`ClientPermit::release`] or drop,
/// whichever comes first.
///
/// A permit only ever releases the acquisition it represents: once it has
/// been force-released and re-acquired by someone else, releasing or
/// dropping this guard leaves the new holder alone.
pub struct ClientPermit {
    client_id: String,
    lock: Arc<ClientLock>,
    ticket: u64,
    released: bool,
}

impl ClientPermit {
    /// Release now. Returns whether this call freed the permit.
    pub fn release(&mut self) -> bool {
        if std::mem::replace(&mut self.released, true) {
            return false;
        }
        let freed = self.lock.release_ticket(self.ticket);
        trace!(client_id = %self.client_id, ticket = self.ticket, freed, "permit released");
        freed
    }
}

impl Drop for ClientPermit {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ClientPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPermit")
            .field("client_id", &self.client_id)
            .field("ticket", &self.ticket)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
        tokio::time::Instant,
    };

    const WAIT: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_are_exclusive() {
        let registry = Arc::new(SemaphoreRegistry::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let _permit = registry.acquire("c1", WAIT).await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(!registry.is_held("c1"));
    }

    #[tokio::test]
    async fn release_of_unknown_client_is_a_noop() {
        let registry = SemaphoreRegistry::new();
        assert!(!registry.release("ghost"));
        assert!(!registry.release(""));
        assert!(registry.is_empty());
        assert!(registry.acquire("", WAIT).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_fails_immediately_while_held() {
        let registry = SemaphoreRegistry::new();
        let permit = registry.acquire("c1", WAIT).await.unwrap();

        let start = Instant::now();
        assert!(registry.acquire("c1", Duration::ZERO).await.is_none());
        assert_eq!(start.elapsed(), Duration::ZERO);

        drop(permit);
        assert!(registry.acquire("c1", Duration::ZERO).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_acquire_times_out() {
        let registry = SemaphoreRegistry::new();
        let _held = registry.acquire("c1", WAIT).await.unwrap();

        let start = Instant::now();
        assert!(registry.acquire("c1", WAIT).await.is_none());
        assert!(start.elapsed() >= WAIT);
    }

    #[tokio::test]
    async fn clients_do_not_share_locks() {
        let registry = SemaphoreRegistry::new();
        let _a = registry.acquire("a", WAIT).await.unwrap();
        assert!(registry.acquire("b", Duration::ZERO).await.is_some());
    }

    #[tokio::test]
    async fn stale_guard_never_releases_a_newer_holder() {
        let registry = SemaphoreRegistry::new();
        let mut first = registry.acquire("c1", WAIT).await.unwrap();

        assert!(registry.release("c1"));
        assert!(!registry.release("c1"));

        let second = registry.acquire("c1", Duration::ZERO).await.unwrap();
        assert!(!first.release());
        drop(first);
        assert!(registry.is_held("c1"));

        drop(second);
        assert!(!registry.is_held("c1"));
    }

    #[tokio::test]
    async fn explicit_release_is_idempotent() {
        let registry = SemaphoreRegistry::new();
        let mut permit = registry.acquire("c1", WAIT).await.unwrap();
        assert!(permit.release());
        assert!(!permit.release());
        assert!(!registry.is_held("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_wakes_waiters() {
        let registry = Arc::new(SemaphoreRegistry::new());
        let _held = registry.acquire("c1", WAIT).await.unwrap();

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.acquire("c1", Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;

        assert!(registry.remove("c1"));
        assert!(waiter.await.unwrap().is_none());
        assert!(!registry.is_held("c1"));
        assert!(!registry.remove("c1"));
    }
}
