use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use nodestore_core::engine::EngineHandle;
use nodestore_core::error::{Result, StoreError};
use nodestore_core::keys::KeySpace;
use nodestore_core::node::endpoint_host;
use nodestore_kv::KvStore;

use crate::certs::{self, TlsPaths};

/// Builds an engine client for an endpoint. Construction must not touch the
/// network; the cache probes every client it hands out.
pub trait EngineConnector: Send + Sync {
    fn connect(&self, endpoint: &str, tls: Option<&TlsPaths>) -> Result<EngineHandle>;
}

/// Process-wide engine clients, keyed by host.
///
/// Two endpoints on the same host but different ports share one entry.
///
/// The lock is held for the lookup and for the insert, never across TLS
/// sync, client construction or the probe. Two concurrent misses for the
/// same host may therefore both build a client; the last insert wins and
/// the other client is dropped when its callers finish with it.
pub struct EngineCache {
    clients: Mutex<HashMap<String, EngineHandle>>,
    connector: Arc<dyn EngineConnector>,
    kv: Arc<dyn KvStore>,
    keys: KeySpace,
    cert_root: Option<PathBuf>,
    probe_timeout: Duration,
}

impl EngineCache {
    pub fn new(
        connector: Arc<dyn EngineConnector>,
        kv: Arc<dyn KvStore>,
        keys: KeySpace,
        cert_root: Option<PathBuf>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            connector,
            kv,
            keys,
            cert_root,
            probe_timeout,
        }
    }

    /// Return a live client for `endpoint`, building one on a miss or when
    /// `force_refresh` is set. Every returned client has just answered an
    /// `info()` probe.
    pub async fn get_or_create(
        &self,
        pod: &str,
        node: &str,
        endpoint: &str,
        force_refresh: bool,
    ) -> Result<EngineHandle> {
        let host = endpoint_host(endpoint)?;

        let cached = if force_refresh {
            None
        } else {
            self.clients.lock().await.get(&host).cloned()
        };

        let engine = match cached {
            Some(engine) => engine,
            None => {
                let engine = self.build(pod, node, &host, endpoint).await?;
                self.probe(endpoint, &engine).await?;
                self.clients.lock().await.insert(host.clone(), engine.clone());
                info!(pod = %pod, node = %node, host = %host, "Cached engine client");
                return Ok(engine);
            }
        };

        self.probe(endpoint, &engine).await?;
        Ok(engine)
    }

    /// Drop the cached client for `host`. Returns whether one was cached.
    pub async fn evict(&self, host: &str) -> bool {
        self.clients.lock().await.remove(host).is_some()
    }

    /// Number of cached clients.
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn build(
        &self,
        pod: &str,
        node: &str,
        host: &str,
        endpoint: &str,
    ) -> Result<EngineHandle> {
        let tls = match &self.cert_root {
            Some(root) => Some(self.ensure_material(pod, node, &root.join(host)).await?),
            None => None,
        };
        self.connector.connect(endpoint, tls.as_ref())
    }

    async fn ensure_material(&self, pod: &str, node: &str, dir: &Path) -> Result<TlsPaths> {
        let paths = TlsPaths::in_dir(dir);
        if paths.all_present().await {
            return Ok(paths);
        }
        debug!(pod = %pod, node = %node, dir = %dir.display(), "TLS material missing, syncing");
        certs::materialize(self.kv.as_ref(), &self.keys, pod, node, dir).await
    }

    async fn probe(&self, endpoint: &str, engine: &EngineHandle) -> Result<()> {
        match tokio::time::timeout(self.probe_timeout, engine.info()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                warn!(endpoint = %endpoint, error = %e, "Engine probe failed");
                Err(StoreError::unreachable(endpoint, e))
            }
            Err(_) => {
                warn!(
                    endpoint = %endpoint,
                    timeout_secs = self.probe_timeout.as_secs(),
                    "Engine probe timed out"
                );
                Err(StoreError::unreachable(
                    endpoint,
                    format!("probe timed out after {:?}", self.probe_timeout),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnector;
    use nodestore_core::keys::TlsKind;
    use nodestore_kv::MemoryStore;

    fn cache_with(
        connector: &FakeConnector,
        cert_root: Option<PathBuf>,
    ) -> (EngineCache, MemoryStore) {
        let kv = MemoryStore::new();
        let cache = EngineCache::new(
            Arc::new(connector.clone()),
            Arc::new(kv.clone()),
            KeySpace::default(),
            cert_root,
            Duration::from_secs(5),
        );
        (cache, kv)
    }

    #[tokio::test]
    async fn test_second_lookup_reuses_client() {
        let connector = FakeConnector::new(4, 1 << 30);
        let (cache, _) = cache_with(&connector, None);

        let a = cache.get_or_create("p", "n1", "tcp://10.0.0.5:2375", false).await.unwrap();
        let b = cache.get_or_create("p", "n1", "tcp://10.0.0.5:2375", false).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(connector.probe_count(), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_same_host_different_port_shares_entry() {
        let connector = FakeConnector::new(4, 1 << 30);
        let (cache, _) = cache_with(&connector, None);

        cache.get_or_create("p", "n1", "tcp://10.0.0.5:2375", false).await.unwrap();
        cache.get_or_create("p", "n2", "tcp://10.0.0.5:2376", false).await.unwrap();

        assert_eq!(connector.connect_count(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_force_refresh_rebuilds() {
        let connector = FakeConnector::new(4, 1 << 30);
        let (cache, _) = cache_with(&connector, None);

        let a = cache.get_or_create("p", "n1", "tcp://10.0.0.5:2375", false).await.unwrap();
        let b = cache.get_or_create("p", "n1", "tcp://10.0.0.5:2375", true).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_probe_is_unreachable_and_not_cached() {
        let connector = FakeConnector::new(4, 1 << 30);
        connector.set_healthy(false);
        let (cache, _) = cache_with(&connector, None);

        let err = cache
            .get_or_create("p", "n1", "tcp://10.0.0.5:2375", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unreachable { .. }));
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_times_out() {
        let connector = FakeConnector::new(4, 1 << 30);
        connector.set_probe_delay(Duration::from_secs(30));
        let (cache, _) = cache_with(&connector, None);

        let err = cache
            .get_or_create("p", "n1", "tcp://10.0.0.5:2375", false)
            .await
            .unwrap_err();
        match err {
            StoreError::Unreachable { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected Unreachable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cached_client_is_probed_every_time() {
        let connector = FakeConnector::new(4, 1 << 30);
        let (cache, _) = cache_with(&connector, None);

        cache.get_or_create("p", "n1", "tcp://10.0.0.5:2375", false).await.unwrap();
        connector.set_healthy(false);
        let err = cache
            .get_or_create("p", "n1", "tcp://10.0.0.5:2375", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unreachable { .. }));
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_evict_forces_rebuild() {
        let connector = FakeConnector::new(4, 1 << 30);
        let (cache, _) = cache_with(&connector, None);

        cache.get_or_create("p", "n1", "tcp://10.0.0.5:2375", false).await.unwrap();
        assert!(cache.evict("10.0.0.5").await);
        assert!(!cache.evict("10.0.0.5").await);
        cache.get_or_create("p", "n1", "tcp://10.0.0.5:2375", false).await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_bad_endpoint_is_validation() {
        let connector = FakeConnector::new(4, 1 << 30);
        let (cache, _) = cache_with(&connector, None);

        let err = cache
            .get_or_create("p", "n1", "http://10.0.0.5:2375", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_tls_material_synced_once_per_host() {
        let tmp = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(4, 1 << 30);
        let (cache, kv) = cache_with(&connector, Some(tmp.path().to_path_buf()));
        let keys = KeySpace::default();
        for kind in TlsKind::ALL {
            kv.set(&keys.node_tls("p", "n1", kind), &format!("{:?} pem", kind))
                .await
                .unwrap();
        }

        cache.get_or_create("p", "n1", "tcp://10.0.0.5:2376", false).await.unwrap();
        let dir = tmp.path().join("10.0.0.5");
        assert!(TlsPaths::in_dir(&dir).all_present().await);
        for kind in TlsKind::ALL {
            kv.delete(&keys.node_tls("p", "n1", kind)).await.unwrap();
        }

        // Files on disk are complete, so a rebuild does not read the store.
        cache.get_or_create("p", "n1", "tcp://10.0.0.5:2376", true).await.unwrap();
        assert_eq!(connector.connect_count(), 2);

        let tls = connector.last_tls().expect("client built with TLS");
        assert_eq!(tls.dir, dir);
    }

    #[tokio::test]
    async fn test_missing_tls_material_fails_build() {
        let tmp = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(4, 1 << 30);
        let (cache, _) = cache_with(&connector, Some(tmp.path().to_path_buf()));

        let err = cache
            .get_or_create("p", "n1", "tcp://10.0.0.5:2376", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PartialMaterial { written: 0, .. }));
        assert_eq!(connector.connect_count(), 0);
    }
}
