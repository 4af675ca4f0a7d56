// nodestore-engine: Container-engine clients, per-host cache, TLS material
// Depends on nodestore-core (types, errors) and nodestore-kv (TLS blobs)

pub mod cache;
pub mod certs;
pub mod docker;
pub mod testing;

pub use cache::{EngineCache, EngineConnector};
pub use certs::TlsPaths;
pub use docker::DockerConnector;
