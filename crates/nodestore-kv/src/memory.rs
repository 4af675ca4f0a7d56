//! In-process KV store and lock table.
//!
//! Same directory and lock semantics as the etcd backend, without a
//! server. Clones share state, so several "processes" in a test can
//! contend on one instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use nodestore_core::error::{Result, StoreError};

use crate::lock::{DistributedLock, LockProvider, LockRelease, LockWait};
use crate::store::{KvNode, KvStore, children_of, dir_prefix};

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<BTreeMap<String, String>>>,
    locks: Arc<LockTable>,
    writes: Arc<AtomicUsize>,
    wait: LockWait,
}

#[derive(Default)]
struct LockTable {
    holders: Mutex<HashMap<String, Holder>>,
    released: Notify,
    next_token: AtomicU64,
}

struct Holder {
    token: u64,
    expires: Instant,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how `acquire` waits on a held lock.
    pub fn with_lock_wait(mut self, wait: LockWait) -> Self {
        self.wait = wait;
        self
    }

    /// Number of successful `set`/`delete` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        guard(&self.data).keys().cloned().collect()
    }

    /// Whether `name` is currently held by an unexpired owner.
    pub fn is_locked(&self, name: &str) -> bool {
        guard(&self.locks.holders)
            .get(name)
            .is_some_and(|h| h.expires > Instant::now())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<KvNode> {
        let data = guard(&self.data);
        if let Some(value) = data.get(key) {
            return Ok(KvNode::Leaf {
                key: key.to_string(),
                value: value.clone(),
            });
        }

        let prefix = dir_prefix(key);
        let below = data
            .range(prefix.clone()..)
            .map(|(k, _)| k.as_str())
            .take_while(|k| k.starts_with(&prefix));
        let children = children_of(&prefix, below);
        if children.is_empty() {
            return Err(StoreError::not_found(key));
        }
        Ok(KvNode::Dir {
            key: key.to_string(),
            children,
        })
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        guard(&self.data).insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if guard(&self.data).remove(key).is_none() {
            return Err(StoreError::not_found(key));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl LockProvider for MemoryStore {
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<DistributedLock> {
        let start = Instant::now();
        let deadline = match self.wait {
            LockWait::Bounded(d) => Some(start + d),
            LockWait::Block | LockWait::TryOnce => None,
        };

        loop {
            // Register for release notifications before inspecting the
            // table so a release between the check and the wait is seen.
            let released = self.locks.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let held_until = {
                let mut holders = guard(&self.locks.holders);
                let now = Instant::now();
                match holders.get(name) {
                    Some(holder) if holder.expires > now => holder.expires,
                    _ => {
                        let token = self.locks.next_token.fetch_add(1, Ordering::SeqCst);
                        holders.insert(
                            name.to_string(),
                            Holder {
                                token,
                                expires: now + ttl,
                            },
                        );
                        debug!(lock = %name, token, "Lock acquired");
                        let release = MemoryLockRelease {
                            locks: Arc::clone(&self.locks),
                            name: name.to_string(),
                            token,
                        };
                        return Ok(DistributedLock::new(name, Box::new(release)));
                    }
                }
            };

            if self.wait == LockWait::TryOnce {
                return Err(StoreError::LockContention {
                    name: name.to_string(),
                });
            }

            let wake_at = match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    return Err(StoreError::LockTimeout {
                        name: name.to_string(),
                        waited_secs: start.elapsed().as_secs(),
                    });
                }
                Some(deadline) => deadline.min(held_until),
                None => held_until,
            };

            tokio::select! {
                _ = &mut released => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }
}

struct MemoryLockRelease {
    locks: Arc<LockTable>,
    name: String,
    token: u64,
}

#[async_trait]
impl LockRelease for MemoryLockRelease {
    async fn release(&mut self) {
        let mut holders = guard(&self.locks.holders);
        // Only the current owner may release; an expired holder whose lock
        // was taken over must not free the new owner's lock.
        if holders.get(&self.name).is_some_and(|h| h.token == self.token) {
            holders.remove(&self.name);
        }
        drop(holders);
        self.locks.released.notify_waiters();
    }
}
