use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use nodestore_core::error::Result;

/// How long `acquire` waits for a lock someone else holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockWait {
    /// Wait until the holder releases or its TTL runs out.
    #[default]
    Block,
    /// Give up with `LockTimeout` after this long.
    Bounded(Duration),
    /// Fail with `LockContention` if the lock is currently held.
    TryOnce,
}

impl LockWait {
    /// `None` blocks, `Some(0)` tries once, anything else is a bound.
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            None => LockWait::Block,
            Some(d) if d.is_zero() => LockWait::TryOnce,
            Some(d) => LockWait::Bounded(d),
        }
    }
}

/// Named, TTL-bound mutual exclusion shared by every process using the
/// same store. Not reentrant: acquiring a name twice from the same caller
/// waits on itself.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Acquire `name`. The lock expires on its own after `ttl` if never
    /// released, so `ttl` must comfortably exceed the critical section.
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<DistributedLock>;
}

/// Backend-specific release of one acquired lock.
#[async_trait]
pub trait LockRelease: Send + Sync {
    async fn release(&mut self);
}

/// A held lock.
///
/// Call [`DistributedLock::release`] on every exit path. If the value is
/// dropped while still held (an early return, a cancelled future) the
/// release is spawned onto the current tokio runtime instead.
pub struct DistributedLock {
    name: String,
    release: Option<Box<dyn LockRelease>>,
}

impl DistributedLock {
    pub fn new(name: impl Into<String>, release: Box<dyn LockRelease>) -> Self {
        Self {
            name: name.into(),
            release: Some(release),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_held(&self) -> bool {
        self.release.is_some()
    }

    /// Release the lock. Calling it again does nothing.
    ///
    /// The release runs as its own task, so cancelling this call does not
    /// abort it part way.
    pub async fn release(&mut self) {
        if let Some(mut release) = self.release.take() {
            let task = tokio::spawn(async move { release.release().await });
            match task.await {
                Ok(()) => debug!(lock = %self.name, "Lock released"),
                Err(e) => warn!(lock = %self.name, error = %e, "Lock release task failed"),
            }
        }
    }
}

impl Drop for DistributedLock {
    fn drop(&mut self) {
        let Some(mut release) = self.release.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let name = self.name.clone();
                handle.spawn(async move {
                    release.release().await;
                    debug!(lock = %name, "Lock released on drop");
                });
            }
            Err(_) => {
                warn!(
                    lock = %self.name,
                    "Lock dropped outside a runtime, held until TTL expiry"
                );
            }
        }
    }
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("name", &self.name)
            .field("held", &self.is_held())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl LockRelease for Counting {
        async fn release(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_lock_wait_from_timeout() {
        assert_eq!(LockWait::from_timeout(None), LockWait::Block);
        assert_eq!(
            LockWait::from_timeout(Some(Duration::ZERO)),
            LockWait::TryOnce
        );
        assert_eq!(
            LockWait::from_timeout(Some(Duration::from_secs(3))),
            LockWait::Bounded(Duration::from_secs(3))
        );
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut lock = DistributedLock::new("p_n", Box::new(Counting(count.clone())));
        assert!(lock.is_held());
        lock.release().await;
        lock.release().await;
        assert!(!lock.is_held());
        drop(lock);
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_on_runtime() {
        let count = Arc::new(AtomicUsize::new(0));
        let lock = DistributedLock::new("p_n", Box::new(Counting(count.clone())));
        drop(lock);
        for _ in 0..10 {
            if count.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    struct SlowCounting(Arc<AtomicUsize>);

    #[async_trait]
    impl LockRelease for SlowCounting {
        async fn release(&mut self) {
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_release_still_completes() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut lock = DistributedLock::new("p_n", Box::new(SlowCounting(count.clone())));

        let cancelled = tokio::time::timeout(Duration::from_secs(1), lock.release()).await;
        assert!(cancelled.is_err());
        assert!(!lock.is_held());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
