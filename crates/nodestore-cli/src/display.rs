use serde::Serialize;
use tabled::Tabled;

use nodestore_core::cpu::CpuMap;
use nodestore_core::engine::EngineInfo;
use nodestore_store::{NodeView, PodView};

/// Display row for `pod list` and `pod get`.
#[derive(Debug, Serialize, Tabled)]
pub struct PodRow {
    #[tabled(rename = "POD")]
    pub name: String,
    #[tabled(rename = "DESCRIPTION")]
    pub desc: String,
}

impl From<&PodView> for PodRow {
    fn from(pod: &PodView) -> Self {
        Self {
            name: pod.name.clone(),
            desc: pod.desc.clone(),
        }
    }
}

/// Display row for `node list` and `node get`.
#[derive(Debug, Serialize, Tabled)]
pub struct NodeRow {
    #[tabled(rename = "NODE")]
    pub name: String,
    #[tabled(rename = "POD")]
    pub podname: String,
    #[tabled(rename = "ENDPOINT")]
    pub endpoint: String,
    #[tabled(rename = "CPU")]
    pub cpu: String,
    #[tabled(rename = "MEM")]
    pub memory: i64,
    #[tabled(rename = "MEM USED")]
    pub memory_used: i64,
    #[tabled(rename = "AVAILABLE")]
    pub available: bool,
}

impl From<&NodeView> for NodeRow {
    fn from(view: &NodeView) -> Self {
        let cpu: CpuMap = view
            .cpu
            .iter()
            .map(|(label, shares)| (label.as_str(), i64::from(*shares)))
            .collect();
        Self {
            name: view.name.clone(),
            podname: view.podname.clone(),
            endpoint: view.endpoint.clone(),
            cpu: cpu.to_string(),
            memory: view.memory,
            memory_used: view.memory_used,
            available: view.available,
        }
    }
}

/// Display row for `node info`.
#[derive(Debug, Serialize, Tabled)]
pub struct EngineInfoRow {
    #[tabled(rename = "HOST")]
    pub name: String,
    #[tabled(rename = "VERSION")]
    pub server_version: String,
    #[tabled(rename = "OS")]
    pub operating_system: String,
    #[tabled(rename = "CPUS")]
    pub ncpu: u32,
    #[tabled(rename = "MEM TOTAL")]
    pub mem_total: i64,
}

impl From<&EngineInfo> for EngineInfoRow {
    fn from(info: &EngineInfo) -> Self {
        Self {
            name: info.name.clone(),
            server_version: info.server_version.clone(),
            operating_system: info.operating_system.clone(),
            ncpu: info.ncpu,
            mem_total: info.mem_total,
        }
    }
}
