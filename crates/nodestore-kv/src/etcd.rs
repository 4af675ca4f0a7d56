use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, GetOptions, LockOptions};
use tracing::{debug, info, warn};

use nodestore_core::config::EtcdConfig;
use nodestore_core::error::{Result, StoreError};
use nodestore_core::keys::KeySpace;
use nodestore_core::retry::retry_async;

use crate::lock::{DistributedLock, LockProvider, LockRelease, LockWait};
use crate::store::{KvNode, KvStore, children_of, dir_prefix};

/// How long a `TryOnce` acquire waits on the lock RPC after seeing the
/// lock free.
const TRY_ONCE_GRACE: Duration = Duration::from_secs(1);

/// etcd v3 backed KV store and lock provider.
///
/// `Client` is a cheap handle over one gRPC channel; every call clones it.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
    keys: KeySpace,
    wait: LockWait,
}

impl EtcdStore {
    /// Connect to the configured endpoints.
    pub async fn connect(config: &EtcdConfig, wait: LockWait) -> Result<Self> {
        let options = ConnectOptions::new()
            .with_connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        let client = retry_async(
            config.connect_attempts,
            Duration::from_millis(500),
            "etcd connect",
            || Client::connect(&config.endpoints, Some(options.clone())),
        )
        .await
        .map_err(StoreError::backend)?;
        info!(endpoints = ?config.endpoints, root = %config.root, "Connected to etcd");
        Ok(Self {
            client,
            keys: KeySpace::new(&config.root),
            wait,
        })
    }

    /// Acquire through etcd's lock service with `lease` attached, keeping
    /// the lease alive while we wait so a long queue does not expire it.
    async fn lock_with_keepalive(
        &self,
        key: &str,
        lease: i64,
        ttl: Duration,
    ) -> Result<Vec<u8>> {
        let mut leases = self.client.clone();
        let (mut keeper, _responses) = leases
            .lease_keep_alive(lease)
            .await
            .map_err(StoreError::backend)?;

        let mut locker = self.client.clone();
        let lock = locker.lock(key, Some(LockOptions::new().with_lease(lease)));
        tokio::pin!(lock);

        let mut tick = tokio::time::interval((ttl / 3).max(Duration::from_millis(500)));
        tick.tick().await;

        loop {
            tokio::select! {
                resp = &mut lock => {
                    return resp
                        .map(|r| r.key().to_vec())
                        .map_err(StoreError::backend);
                }
                _ = tick.tick() => {
                    if let Err(e) = keeper.keep_alive().await {
                        warn!(lock = %key, lease, error = %e, "Lease keep-alive failed while waiting");
                    }
                }
            }
        }
    }

    /// Whether anyone currently holds or queues for `key`.
    async fn lock_is_held(&self, key: &str) -> Result<bool> {
        let mut client = self.client.clone();
        let resp = client
            .get(
                dir_prefix(key),
                Some(GetOptions::new().with_prefix().with_keys_only().with_limit(1)),
            )
            .await
            .map_err(StoreError::backend)?;
        Ok(!resp.kvs().is_empty())
    }

    async fn revoke(&self, lease: i64) {
        let mut client = self.client.clone();
        if let Err(e) = client.lease_revoke(lease).await {
            warn!(lease, error = %e, "Failed to revoke lock lease, it will expire on its own");
        }
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<KvNode> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await.map_err(StoreError::backend)?;
        if let Some(kv) = resp.kvs().first() {
            let value = kv
                .value_str()
                .map_err(|e| StoreError::corrupt(key, e.to_string()))?;
            return Ok(KvNode::Leaf {
                key: key.to_string(),
                value: value.to_string(),
            });
        }

        let prefix = dir_prefix(key);
        let resp = client
            .get(
                prefix.as_str(),
                Some(GetOptions::new().with_prefix().with_keys_only()),
            )
            .await
            .map_err(StoreError::backend)?;
        let below = resp.kvs().iter().filter_map(|kv| kv.key_str().ok());
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
        let mut client = self.client.clone();
        client
            .put(key, value, None)
            .await
            .map_err(StoreError::backend)?;
        debug!(key = %key, "Stored value");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut client = self.client.clone();
        let resp = client.delete(key, None).await.map_err(StoreError::backend)?;
        if resp.deleted() == 0 {
            return Err(StoreError::not_found(key));
        }
        Ok(())
    }
}

#[async_trait]
impl LockProvider for EtcdStore {
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<DistributedLock> {
        let key = self.keys.lock(name);
        let ttl_secs = ttl.as_secs().max(1) as i64;

        if self.wait == LockWait::TryOnce && self.lock_is_held(&key).await? {
            return Err(StoreError::LockContention {
                name: name.to_string(),
            });
        }

        let mut client = self.client.clone();
        let lease = client
            .lease_grant(ttl_secs, None)
            .await
            .map_err(StoreError::backend)?
            .id();

        let started = tokio::time::Instant::now();
        let attempt = self.lock_with_keepalive(&key, lease, ttl);
        let result = match self.wait {
            LockWait::Block => attempt.await,
            LockWait::Bounded(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| {
                    Err(StoreError::LockTimeout {
                        name: name.to_string(),
                        waited_secs: started.elapsed().as_secs(),
                    })
                }),
            LockWait::TryOnce => tokio::time::timeout(TRY_ONCE_GRACE, attempt)
                .await
                .unwrap_or_else(|_| {
                    Err(StoreError::LockContention {
                        name: name.to_string(),
                    })
                }),
        };

        match result {
            Ok(lock_key) => {
                debug!(lock = %name, lease, "Lock acquired");
                let release = EtcdLockRelease {
                    client: self.client.clone(),
                    name: name.to_string(),
                    lock_key,
                    lease,
                };
                Ok(DistributedLock::new(name, Box::new(release)))
            }
            Err(e) => {
                // The server may still grant the abandoned request; revoking
                // the lease deletes our queued key either way.
                self.revoke(lease).await;
                Err(e)
            }
        }
    }
}

struct EtcdLockRelease {
    client: Client,
    name: String,
    lock_key: Vec<u8>,
    lease: i64,
}

#[async_trait]
impl LockRelease for EtcdLockRelease {
    async fn release(&mut self) {
        if let Err(e) = self.client.unlock(self.lock_key.clone()).await {
            warn!(lock = %self.name, error = %e, "Failed to unlock, relying on lease revoke");
        }
        if let Err(e) = self.client.lease_revoke(self.lease).await {
            warn!(
                lock = %self.name,
                lease = self.lease,
                error = %e,
                "Failed to revoke lock lease, it will expire on its own"
            );
        }
    }
}
