use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cpu::CpuMap;
use crate::engine::{EngineHandle, EngineInfo};
use crate::error::{Result, StoreError};

/// Scheme every engine endpoint must use.
pub const ENDPOINT_SCHEME: &str = "tcp://";

/// A machine exposing a container-engine endpoint, persisted as JSON at
/// `{root}/pod/{podname}/node/{name}/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub endpoint: String,
    pub podname: String,
    #[serde(default)]
    pub public: bool,
    /// Shares currently available per core.
    pub cpu: CpuMap,
    /// `cpu` as it was at registration.
    #[serde(default)]
    pub init_cpu: CpuMap,
    #[serde(default)]
    pub cpu_used: f64,
    #[serde(default)]
    pub mem_cap: i64,
    #[serde(default)]
    pub init_mem_cap: i64,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub numa: HashMap<String, String>,
    #[serde(default)]
    pub numa_memory: HashMap<String, i64>,
    /// Live engine client. Attached on every load, never persisted.
    #[serde(skip)]
    pub engine: Option<EngineHandle>,
}

fn default_available() -> bool {
    true
}

impl Node {
    /// A freshly registered node whose current CPU equals its baseline.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        podname: impl Into<String>,
        public: bool,
        cpu: CpuMap,
        mem_cap: i64,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            podname: podname.into(),
            public,
            init_cpu: cpu.clone(),
            cpu,
            cpu_used: 0.0,
            mem_cap,
            init_mem_cap: mem_cap,
            available: true,
            labels: HashMap::new(),
            numa: HashMap::new(),
            numa_memory: HashMap::new(),
            engine: None,
        }
    }

    /// Host part of the endpoint, used as the engine cache key.
    pub fn host(&self) -> Result<String> {
        endpoint_host(&self.endpoint)
    }

    /// Live engine information. Fails if no engine is attached.
    pub async fn info(&self) -> Result<EngineInfo> {
        let engine = self.engine.as_ref().ok_or_else(|| {
            StoreError::unreachable(&self.endpoint, "no engine client attached")
        })?;
        engine.info().await
    }

    /// Serialize to the persisted document. The engine handle is skipped.
    pub fn to_document(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a persisted document. Parse failures are reported as `Corrupt`
    /// against `key`.
    pub fn from_document(key: &str, raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| StoreError::corrupt(key, e.to_string()))
    }
}

/// Check that an endpoint uses `tcp://` and carries a `host:port` authority.
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    endpoint_host(endpoint).map(|_| ())
}

/// Extract the host from `tcp://host:port[/path]`.
///
/// IPv6 hosts are written in brackets (`tcp://[::1]:2375`) and returned
/// without them. A missing port is rejected.
pub fn endpoint_host(endpoint: &str) -> Result<String> {
    let rest = endpoint.strip_prefix(ENDPOINT_SCHEME).ok_or_else(|| {
        StoreError::validation(format!(
            "endpoint must start with {}: {:?}",
            ENDPOINT_SCHEME, endpoint
        ))
    })?;
    let authority = rest.split('/').next().unwrap_or_default();

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed.split_once(']').ok_or_else(|| {
            StoreError::validation(format!("unterminated IPv6 host in {:?}", endpoint))
        })?;
        let port = after.strip_prefix(':').unwrap_or_default();
        (host, port)
    } else {
        authority.rsplit_once(':').ok_or_else(|| {
            StoreError::validation(format!("endpoint has no port: {:?}", endpoint))
        })?
    };

    if host.is_empty() {
        return Err(StoreError::validation(format!(
            "endpoint has no host: {:?}",
            endpoint
        )));
    }
    // The host names a directory under the TLS cert root.
    if host == "." || host == ".." {
        return Err(StoreError::validation(format!(
            "endpoint host is not a name or address: {:?}",
            endpoint
        )));
    }
    if port.parse::<u16>().is_err() {
        return Err(StoreError::validation(format!(
            "endpoint has no valid port: {:?}",
            endpoint
        )));
    }
    Ok(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_host_ipv4() {
        assert_eq!(endpoint_host("tcp://10.0.0.5:2375").unwrap(), "10.0.0.5");
    }

    #[test]
    fn test_endpoint_host_hostname_with_path() {
        assert_eq!(
            endpoint_host("tcp://docker.internal:2376/v1").unwrap(),
            "docker.internal"
        );
    }

    #[test]
    fn test_endpoint_host_ipv6() {
        assert_eq!(endpoint_host("tcp://[::1]:2375").unwrap(), "::1");
    }

    #[test]
    fn test_endpoint_requires_tcp_scheme() {
        let err = endpoint_host("http://10.0.0.5:2375").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(validate_endpoint("unix:///var/run/docker.sock").is_err());
    }

    #[test]
    fn test_endpoint_requires_port() {
        assert!(matches!(
            endpoint_host("tcp://10.0.0.5").unwrap_err(),
            StoreError::Validation(_)
        ));
        assert!(endpoint_host("tcp://10.0.0.5:notaport").is_err());
        assert!(endpoint_host("tcp://:2375").is_err());
    }

    #[test]
    fn test_same_host_different_ports() {
        assert_eq!(
            endpoint_host("tcp://10.0.0.5:2375").unwrap(),
            endpoint_host("tcp://10.0.0.5:2376").unwrap()
        );
    }

    #[test]
    fn test_new_node_baseline_matches_cpu() {
        let node = Node::new(
            "n1",
            "tcp://10.0.0.5:2375",
            "default",
            false,
            CpuMap::with_cores(2, 10),
            1024,
        );
        assert_eq!(node.cpu, node.init_cpu);
        assert_eq!(node.mem_cap, node.init_mem_cap);
        assert!(node.available);
        assert_eq!(node.host().unwrap(), "10.0.0.5");
    }

    #[test]
    fn test_document_never_contains_engine() {
        let node = Node::new(
            "n1",
            "tcp://10.0.0.5:2375",
            "default",
            true,
            CpuMap::with_cores(1, 10),
            0,
        );
        let doc = node.to_document().unwrap();
        assert!(!doc.contains("engine"));
        let parsed = Node::from_document("k", &doc).unwrap();
        assert!(parsed.engine.is_none());
        assert_eq!(parsed.cpu, node.cpu);
        assert!(parsed.public);
    }

    #[test]
    fn test_from_document_rejects_garbage_as_corrupt() {
        let err =
            Node::from_document("/nodestore/pod/p/node/n/info", "{not json").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_minimal_document_fills_defaults() {
        let raw = r#"{"name":"n1","endpoint":"tcp://h:1","podname":"p","cpu":{"0":10}}"#;
        let node = Node::from_document("k", raw).unwrap();
        assert!(node.available);
        assert!(!node.public);
        assert!(node.init_cpu.is_empty());
        assert_eq!(node.cpu.get("0"), Some(10));
    }

    #[tokio::test]
    async fn test_info_without_engine_is_unreachable() {
        let node = Node::new("n1", "tcp://10.0.0.5:2375", "default", false, CpuMap::new(), 0);
        let err = node.info().await.unwrap_err();
        assert!(matches!(err, StoreError::Unreachable { .. }));
    }

    #[test]
    fn test_dot_hosts_rejected() {
        for endpoint in ["tcp://..:2375", "tcp://.:2375", "tcp://../x:2375"] {
            let err = endpoint_host(endpoint).unwrap_err();
            assert!(
                matches!(err, StoreError::Validation(_)),
                "{} should be rejected",
                endpoint
            );
        }
        assert_eq!(endpoint_host("tcp://a.b:2375").unwrap(), "a.b");
    }
}
