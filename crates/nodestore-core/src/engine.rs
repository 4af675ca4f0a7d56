use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What a container engine reports about its host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub server_version: String,
    pub operating_system: String,
    pub ncpu: u32,
    pub mem_total: i64,
}

/// A live client for one node's container engine.
///
/// Implementations hold network resources and are shared through
/// [`EngineHandle`]; several `Node` values for the same host point at the
/// same client.
#[async_trait]
pub trait Engine: Send + Sync + fmt::Debug {
    /// Query engine and host information. Also serves as the liveness probe.
    async fn info(&self) -> Result<EngineInfo>;
}

pub type EngineHandle = Arc<dyn Engine>;
