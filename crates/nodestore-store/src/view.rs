//! Flat, serializable records for callers outside the store.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use nodestore_core::cpu::CpuMap;
use nodestore_core::node::Node;
use nodestore_core::pod::Pod;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub name: String,
    pub endpoint: String,
    pub podname: String,
    pub public: bool,
    pub cpu: BTreeMap<String, i32>,
    pub cpu_used: f64,
    pub memory: i64,
    pub memory_used: i64,
    pub available: bool,
    pub labels: HashMap<String, String>,
    pub init_cpu: BTreeMap<String, i32>,
    pub init_memory: i64,
    /// Engine info as JSON, or the error text if the engine could not be
    /// queried.
    pub info: String,
    pub numa: HashMap<String, String>,
    pub numa_memory: HashMap<String, i64>,
}

impl NodeView {
    /// Snapshot `node`, querying its engine for the `info` field.
    pub async fn from_node(node: &Node) -> Self {
        let info = match node.info().await {
            Ok(info) => serde_json::to_string(&info).unwrap_or_else(|e| e.to_string()),
            Err(e) => e.to_string(),
        };
        Self {
            name: node.name.clone(),
            endpoint: node.endpoint.clone(),
            podname: node.podname.clone(),
            public: node.public,
            cpu: narrow(&node.cpu),
            cpu_used: node.cpu_used,
            memory: node.mem_cap,
            memory_used: node.init_mem_cap - node.mem_cap,
            available: node.available,
            labels: node.labels.clone(),
            init_cpu: narrow(&node.init_cpu),
            init_memory: node.init_mem_cap,
            info,
            numa: node.numa.clone(),
            numa_memory: node.numa_memory.clone(),
        }
    }
}

/// Share counts as 32-bit values, saturating at the bounds.
fn narrow(cpu: &CpuMap) -> BTreeMap<String, i32> {
    cpu.iter()
        .map(|(label, shares)| {
            let shares = shares.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
            (label.to_string(), shares)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodView {
    pub name: String,
    pub desc: String,
}

impl From<&Pod> for PodView {
    fn from(pod: &Pod) -> Self {
        Self {
            name: pod.name.clone(),
            desc: pod.desc.clone(),
        }
    }
}
