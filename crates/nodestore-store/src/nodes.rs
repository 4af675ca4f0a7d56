use tracing::{debug, info, warn};

use nodestore_core::cpu::CpuMap;
use nodestore_core::engine::EngineInfo;
use nodestore_core::error::{Result, StoreError};
use nodestore_core::keys::TlsKind;
use nodestore_core::node::{Node, validate_endpoint};

use crate::store::Store;

/// PEM-encoded TLS material for reaching a node's engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub ca: String,
    pub cert: String,
    pub key: String,
}

impl TlsMaterial {
    fn pem(&self, kind: TlsKind) -> &str {
        match kind {
            TlsKind::Ca => &self.ca,
            TlsKind::Cert => &self.cert,
            TlsKind::Key => &self.key,
        }
    }
}

/// Registration request for a node.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub name: String,
    pub endpoint: String,
    pub podname: String,
    pub tls: Option<TlsMaterial>,
    pub public: bool,
}

/// A listing that stopped at its first failure.
///
/// `nodes` holds everything loaded before `error` occurred, in listing order.
#[derive(Debug, thiserror::Error)]
#[error("node listing stopped after {} node(s): {error}", .nodes.len())]
pub struct PartialNodes {
    pub nodes: Vec<Node>,
    #[source]
    pub error: StoreError,
}

impl From<StoreError> for PartialNodes {
    fn from(error: StoreError) -> Self {
        Self {
            nodes: Vec::new(),
            error,
        }
    }
}

impl Store {
    /// Load a node and attach a probed engine client.
    pub async fn get_node(&self, pod: &str, name: &str) -> Result<Node> {
        let mut node = self.load_node(pod, name).await?;
        let engine = self
            .engines
            .get_or_create(pod, name, &node.endpoint, false)
            .await?;
        node.engine = Some(engine);
        Ok(node)
    }

    /// Load a node's persisted document without touching its engine.
    pub(crate) async fn load_node(&self, pod: &str, name: &str) -> Result<Node> {
        let key = self.keys.node_info(pod, name);
        let raw = self.kv.get_value(&key).await?;
        Node::from_document(&key, &raw)
    }

    /// Register a node: store its TLS material, ask its engine for the
    /// core count and memory, and persist the seeded record.
    pub async fn add_node(&self, new: NewNode) -> Result<Node> {
        validate_endpoint(&new.endpoint)?;
        if new.name.is_empty() || new.name.contains('/') {
            return Err(StoreError::validation(format!(
                "invalid node name {:?}",
                new.name
            )));
        }
        match self.get_pod(&new.podname).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                return Err(StoreError::validation(format!(
                    "pod {:?} does not exist",
                    new.podname
                )));
            }
            Err(e) => return Err(e),
        }

        if let Some(tls) = &new.tls {
            for kind in TlsKind::ALL {
                self.kv
                    .set(&self.keys.node_tls(&new.podname, &new.name, kind), tls.pem(kind))
                    .await?;
            }
            debug!(pod = %new.podname, node = %new.name, "Stored TLS material");
        }

        let engine = self
            .engines
            .get_or_create(&new.podname, &new.name, &new.endpoint, false)
            .await?;
        let info = engine.info().await?;

        let mut node = Node::new(
            new.name,
            new.endpoint,
            new.podname,
            new.public,
            CpuMap::with_cores(info.ncpu, self.cpu_weight),
            info.mem_total,
        );
        self.update_node(&node).await?;
        info!(
            pod = %node.podname,
            node = %node.name,
            endpoint = %node.endpoint,
            cores = info.ncpu,
            mem_total = info.mem_total,
            "Node registered"
        );
        node.engine = Some(engine);
        Ok(node)
    }

    /// Every node of `pod`. An absent pod directory lists as empty.
    pub async fn get_nodes_by_pod(
        &self,
        pod: &str,
    ) -> std::result::Result<Vec<Node>, PartialNodes> {
        let names = self.kv.list(&self.keys.pod_nodes(pod)).await?;
        let mut nodes = Vec::with_capacity(names.len());
        for name in names {
            match self.get_node(pod, &name).await {
                Ok(node) => nodes.push(node),
                Err(error) => {
                    warn!(pod = %pod, node = %name, error = %error, "Node listing stopped");
                    return Err(PartialNodes { nodes, error });
                }
            }
        }
        Ok(nodes)
    }

    /// Every node of every pod, pods in name order.
    pub async fn get_all_nodes(&self) -> std::result::Result<Vec<Node>, PartialNodes> {
        let pods = self.get_all_pods().await?;
        let mut nodes = Vec::new();
        for pod in pods {
            match self.get_nodes_by_pod(&pod.name).await {
                Ok(more) => nodes.extend(more),
                Err(partial) => {
                    nodes.extend(partial.nodes);
                    return Err(PartialNodes {
                        nodes,
                        error: partial.error,
                    });
                }
            }
        }
        Ok(nodes)
    }

    /// Overwrite a node's persisted document. The engine handle is never
    /// written.
    pub async fn update_node(&self, node: &Node) -> Result<()> {
        let key = self.keys.node_info(&node.podname, &node.name);
        self.kv.set(&key, &node.to_document()?).await
    }

    /// Live engine information for a node.
    pub async fn node_info(&self, pod: &str, name: &str) -> Result<EngineInfo> {
        self.get_node(pod, name).await?.info().await
    }
}
