//! KV wrappers for exercising interleavings in tests.

use std::time::Duration;

use async_trait::async_trait;

use nodestore_core::error::Result;

use crate::memory::MemoryStore;
use crate::store::{KvNode, KvStore};

/// A [`MemoryStore`] whose reads and writes give up the scheduler before
/// touching data, so concurrent read-modify-write sequences interleave.
///
/// With a write delay set, every `set` also sleeps that long first, which
/// leaves a window to cancel a caller mid-update.
#[derive(Clone, Default)]
pub struct YieldingStore {
    inner: MemoryStore,
    write_delay: Option<Duration>,
}

impl YieldingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            write_delay: None,
        }
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl KvStore for YieldingStore {
    async fn get(&self, key: &str) -> Result<KvNode> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tokio::task::yield_now().await;
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        tokio::task::yield_now().await;
        self.inner.delete(key).await
    }
}
