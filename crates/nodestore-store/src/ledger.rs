use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use nodestore_core::cpu::CpuMap;
use nodestore_core::error::{Result, StoreError};
use nodestore_core::keys::node_lock_name;
use nodestore_core::node::Node;

use crate::store::Store;

/// Direction of a CPU share update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuOp {
    /// Return shares to the node.
    Add,
    /// Take shares from the node.
    Sub,
}

impl FromStr for CpuOp {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" | "+" => Ok(CpuOp::Add),
            "sub" | "-" => Ok(CpuOp::Sub),
            other => Err(StoreError::validation(format!(
                "unknown cpu operation {:?} (expected add, +, sub or -)",
                other
            ))),
        }
    }
}

impl fmt::Display for CpuOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuOp::Add => write!(f, "add"),
            CpuOp::Sub => write!(f, "sub"),
        }
    }
}

impl Store {
    /// Apply `delta` to a node's available CPU under the node's lock.
    ///
    /// The read-modify-write runs while holding `{pod}_{node}`, so
    /// concurrent updates from any process are serialized. Subtraction may
    /// leave a label negative; the stored value is returned unchanged and
    /// the label is logged as over-committed.
    pub async fn update_node_cpu(
        &self,
        pod: &str,
        node: &str,
        delta: &CpuMap,
        op: CpuOp,
    ) -> Result<Node> {
        let mut lock = self
            .locks
            .acquire(&node_lock_name(pod, node), self.lock_ttl)
            .await?;
        let result = self.apply_cpu_delta(pod, node, delta, op).await;
        lock.release().await;
        result
    }

    async fn apply_cpu_delta(
        &self,
        pod: &str,
        node: &str,
        delta: &CpuMap,
        op: CpuOp,
    ) -> Result<Node> {
        let mut record = self.load_node(pod, node).await?;
        match op {
            CpuOp::Add => record.cpu.add(delta),
            CpuOp::Sub => record.cpu.sub(delta),
        }
        self.update_node(&record).await?;

        let over = record.cpu.overcommitted();
        if !over.is_empty() {
            warn!(pod = %pod, node = %node, cores = ?over, "CPU over-committed");
        }
        debug!(
            pod = %pod,
            node = %node,
            op = %op,
            delta = %delta,
            cpu = %record.cpu,
            "CPU updated"
        );
        Ok(record)
    }
}
