//! In-process engine doubles for tests.
//!
//! [`FakeConnector`] hands out [`FakeEngine`]s that share one state block, so
//! a test can flip health or slow the probe after clients are cached and
//! count how many clients were built.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use nodestore_core::engine::{Engine, EngineHandle, EngineInfo};
use nodestore_core::error::{Result, StoreError};

use crate::cache::EngineConnector;
use crate::certs::TlsPaths;

#[derive(Default)]
struct FakeState {
    ncpu: u32,
    mem_total: i64,
    unhealthy: AtomicBool,
    refuse_connect: AtomicBool,
    probe_delay: Mutex<Option<Duration>>,
    connects: AtomicUsize,
    probes: AtomicUsize,
    last_tls: Mutex<Option<TlsPaths>>,
}

#[derive(Clone)]
pub struct FakeConnector {
    state: Arc<FakeState>,
}

impl FakeConnector {
    pub fn new(ncpu: u32, mem_total: i64) -> Self {
        Self {
            state: Arc::new(FakeState {
                ncpu,
                mem_total,
                ..FakeState::default()
            }),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    pub fn set_refuse_connect(&self, refuse: bool) {
        self.state.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.state.probe_delay.lock() {
            *slot = Some(delay);
        }
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    /// TLS paths passed to the most recent connect, if any.
    pub fn last_tls(&self) -> Option<TlsPaths> {
        self.state.last_tls.lock().ok().and_then(|t| t.clone())
    }
}

impl fmt::Debug for FakeConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeConnector")
            .field("connects", &self.connect_count())
            .finish()
    }
}

impl EngineConnector for FakeConnector {
    fn connect(&self, endpoint: &str, tls: Option<&TlsPaths>) -> Result<EngineHandle> {
        if self.state.refuse_connect.load(Ordering::SeqCst) {
            return Err(StoreError::unreachable(endpoint, "connection refused"));
        }
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut last) = self.state.last_tls.lock() {
            *last = tls.cloned();
        }
        Ok(Arc::new(FakeEngine {
            id,
            endpoint: endpoint.to_string(),
            state: self.state.clone(),
        }))
    }
}

pub struct FakeEngine {
    id: usize,
    endpoint: String,
    state: Arc<FakeState>,
}

impl fmt::Debug for FakeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeEngine")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn info(&self) -> Result<EngineInfo> {
        self.state.probes.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.probe_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.unhealthy.load(Ordering::SeqCst) {
            return Err(StoreError::Engine(format!("{}: engine not responding", self.endpoint)));
        }
        Ok(EngineInfo {
            name: format!("fake-{}", self.id),
            server_version: "24.0.0".to_string(),
            operating_system: "linux".to_string(),
            ncpu: self.state.ncpu,
            mem_total: self.state.mem_total,
        })
    }
}
