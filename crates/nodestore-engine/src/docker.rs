use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::{ClientVersion, Docker};
use tracing::debug;

use nodestore_core::config::{DockerConfig, parse_api_version};
use nodestore_core::engine::{Engine, EngineHandle, EngineInfo};
use nodestore_core::error::{Result, StoreError};

use crate::cache::EngineConnector;
use crate::certs::TlsPaths;

/// Builds Docker Engine API clients over plain TCP or mutual TLS.
///
/// Construction does no network I/O; reachability is established by the
/// cache's liveness probe.
#[derive(Debug, Clone)]
pub struct DockerConnector {
    api_version: ClientVersion,
    timeout_secs: u64,
}

/// Make aws-lc-rs the process-wide rustls provider.
///
/// The engine client builds its TLS config from the process default, and
/// more than one provider is compiled in, so rustls cannot pick one itself.
/// Installing fails harmlessly when a provider is already set.
fn install_crypto_provider() {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_ok()
    {
        debug!("Installed aws-lc-rs as the rustls crypto provider");
    }
}

impl DockerConnector {
    pub fn from_config(config: &DockerConfig) -> Result<Self> {
        install_crypto_provider();
        let (major_version, minor_version) = parse_api_version(&config.api_version)
            .map_err(|e| StoreError::validation(e.to_string()))?;
        Ok(Self {
            api_version: ClientVersion {
                major_version,
                minor_version,
            },
            timeout_secs: config.connect_timeout_secs,
        })
    }
}

impl EngineConnector for DockerConnector {
    fn connect(&self, endpoint: &str, tls: Option<&TlsPaths>) -> Result<EngineHandle> {
        let docker = match tls {
            Some(paths) => {
                install_crypto_provider();
                paths
                    .validate()
                    .map_err(|e| StoreError::unreachable(endpoint, e))?;
                Docker::connect_with_ssl(
                    endpoint,
                    &paths.key,
                    &paths.cert,
                    &paths.ca,
                    self.timeout_secs,
                    &self.api_version,
                )
            }
            None => Docker::connect_with_http(endpoint, self.timeout_secs, &self.api_version),
        }
        .map_err(|e| StoreError::unreachable(endpoint, e))?;

        debug!(
            endpoint = %endpoint,
            tls = tls.is_some(),
            api_version = %format!("{}.{}", self.api_version.major_version, self.api_version.minor_version),
            "Created engine client"
        );
        Ok(Arc::new(DockerEngine {
            docker,
            endpoint: endpoint.to_string(),
        }))
    }
}

/// One Docker Engine API client.
pub struct DockerEngine {
    docker: Docker,
    endpoint: String,
}

impl fmt::Debug for DockerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerEngine")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn info(&self) -> Result<EngineInfo> {
        let info = self
            .docker
            .info()
            .await
            .map_err(|e| StoreError::Engine(format!("{}: {}", self.endpoint, e)))?;
        Ok(EngineInfo {
            name: info.name.unwrap_or_default(),
            server_version: info.server_version.unwrap_or_default(),
            operating_system: info.operating_system.unwrap_or_default(),
            ncpu: info.ncpu.unwrap_or(0).max(0) as u32,
            mem_total: info.mem_total.unwrap_or(0),
        })
    }
}
