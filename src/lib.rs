//! # nodestore: node and pod records for a container cluster
//!
//! Facade crate that re-exports the nodestore workspace crates so consumers
//! can depend on a single `nodestore` library.
//!
//! ## Crate breakdown
//!
//! | Module | Crate | Purpose |
//! |--------|-------|---------|
//! | [`core`] | nodestore-core | Node, pod and CPU types, keys, config, errors |
//! | [`kv`] | nodestore-kv | KV store adapter, distributed locks (etcd, in-memory) |
//! | [`engine`] | nodestore-engine | Engine client cache, Docker connector, TLS material |
//! | [`store`] | nodestore-store | Pod/node repositories, CPU ledger, views |
//! | [`cli`] | nodestore-cli | Command-line interface |

pub use nodestore_cli as cli;
pub use nodestore_core as core;
pub use nodestore_engine as engine;
pub use nodestore_kv as kv;
pub use nodestore_store as store;
