use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use nodestore_core::config::Config;
use nodestore_core::error::Result;
use nodestore_core::keys::KeySpace;
use nodestore_engine::{DockerConnector, EngineCache, EngineConnector};
use nodestore_kv::{EtcdStore, KvStore, LockProvider, LockWait, MemoryStore};

/// Composes the KV store, lock provider and engine cache behind the pod,
/// node and ledger operations.
#[derive(Clone)]
pub struct Store {
    pub(crate) kv: Arc<dyn KvStore>,
    pub(crate) locks: Arc<dyn LockProvider>,
    pub(crate) engines: Arc<EngineCache>,
    pub(crate) keys: KeySpace,
    pub(crate) lock_ttl: Duration,
    pub(crate) cpu_weight: i64,
}

impl Store {
    pub fn new(
        kv: Arc<dyn KvStore>,
        locks: Arc<dyn LockProvider>,
        engines: Arc<EngineCache>,
        config: &Config,
    ) -> Self {
        Self {
            kv,
            locks,
            engines,
            keys: config.keys(),
            lock_ttl: config.lock.ttl(),
            cpu_weight: config.node.cpu_shares_per_core,
        }
    }

    /// Connect to etcd and reach engines through Docker.
    pub async fn connect(config: &Config) -> Result<Self> {
        let wait = LockWait::from_timeout(config.lock.acquire_timeout());
        let etcd = Arc::new(EtcdStore::connect(&config.etcd, wait).await?);
        let connector = Arc::new(DockerConnector::from_config(&config.docker)?);
        info!(
            endpoints = ?config.etcd.endpoints,
            root = %config.etcd.root,
            tls = config.docker.cert_path.is_some(),
            "Store connected"
        );
        Ok(Self::from_backends(etcd.clone(), etcd, connector, config))
    }

    /// An in-process store over `kv`, for tests and local tooling.
    pub fn in_memory(
        kv: MemoryStore,
        connector: Arc<dyn EngineConnector>,
        config: &Config,
    ) -> Self {
        let kv = Arc::new(kv);
        Self::from_backends(kv.clone(), kv, connector, config)
    }

    /// Build the engine cache over `kv` and compose the store.
    pub fn from_backends(
        kv: Arc<dyn KvStore>,
        locks: Arc<dyn LockProvider>,
        connector: Arc<dyn EngineConnector>,
        config: &Config,
    ) -> Self {
        let engines = Arc::new(EngineCache::new(
            connector,
            kv.clone(),
            config.keys(),
            config.docker.cert_path.clone(),
            config.docker.probe_timeout(),
        ));
        Self::new(kv, locks, engines, config)
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn engines(&self) -> &EngineCache {
        &self.engines
    }
}
