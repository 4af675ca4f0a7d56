use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::keys::{DEFAULT_ROOT, KeySpace};

/// Top-level nodestore configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub etcd: EtcdConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub node: NodeConfig,
}

/// Where the KV store lives and which prefix we own.
#[derive(Debug, Clone, Deserialize)]
pub struct EtcdConfig {
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    /// Key prefix for every record.
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_etcd_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Connection attempts before giving up, with doubling backoff.
    #[serde(default = "default_etcd_connect_attempts")]
    pub connect_attempts: u32,
}

/// Container-engine client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    /// Local directory for per-host TLS material. When unset, engines are
    /// reached over plain TCP.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    /// Engine API version, `major.minor`.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Liveness probe timeout (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Request timeout for the engine client itself (seconds).
    #[serde(default = "default_docker_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Distributed lock settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    /// Lease length; a crashed holder loses the lock after this long.
    #[serde(default = "default_lock_ttl")]
    pub ttl_secs: u64,
    /// Max wait for a held lock. `None` waits indefinitely, `Some(0)` tries
    /// once.
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
}

/// Node registration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Shares assigned to each core when a node registers.
    #[serde(default = "default_cpu_shares_per_core")]
    pub cpu_shares_per_core: i64,
}

fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".to_string()]
}
fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}
fn default_etcd_connect_timeout() -> u64 {
    5
}
fn default_etcd_connect_attempts() -> u32 {
    3
}
fn default_api_version() -> String {
    "1.41".to_string()
}
fn default_probe_timeout() -> u64 {
    5
}
fn default_docker_connect_timeout() -> u64 {
    120
}
fn default_lock_ttl() -> u64 {
    30
}
fn default_cpu_shares_per_core() -> i64 {
    10
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            root: default_root(),
            connect_timeout_secs: default_etcd_connect_timeout(),
            connect_attempts: default_etcd_connect_attempts(),
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            api_version: default_api_version(),
            probe_timeout_secs: default_probe_timeout(),
            connect_timeout_secs: default_docker_connect_timeout(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lock_ttl(),
            acquire_timeout_secs: None,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cpu_shares_per_core: default_cpu_shares_per_core(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read nodestore config: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse config from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).with_context(|| "Failed to parse nodestore config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.etcd.endpoints.is_empty() {
            anyhow::bail!("[etcd] endpoints must list at least one address");
        }
        if !self.etcd.root.starts_with('/') {
            anyhow::bail!("[etcd] root must start with '/', got {:?}", self.etcd.root);
        }
        if self.lock.ttl_secs == 0 {
            anyhow::bail!("[lock] ttl_secs must be positive");
        }
        if self.docker.probe_timeout_secs == 0 {
            anyhow::bail!("[docker] probe_timeout_secs must be positive");
        }
        if self.node.cpu_shares_per_core <= 0 {
            anyhow::bail!("[node] cpu_shares_per_core must be positive");
        }
        parse_api_version(&self.docker.api_version)?;
        Ok(())
    }

    pub fn keys(&self) -> KeySpace {
        KeySpace::new(&self.etcd.root)
    }
}

impl DockerConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_secs.map(Duration::from_secs)
    }
}

/// Split an API version like `1.41` into `(1, 41)`.
pub fn parse_api_version(version: &str) -> Result<(usize, usize)> {
    let (major, minor) = version
        .split_once('.')
        .ok_or_else(|| anyhow::anyhow!("API version must be major.minor, got {:?}", version))?;
    let major = major
        .parse()
        .with_context(|| format!("Invalid API major version in {:?}", version))?;
    let minor = minor
        .parse()
        .with_context(|| format!("Invalid API minor version in {:?}", version))?;
    Ok((major, minor))
}
