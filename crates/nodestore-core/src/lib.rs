// nodestore-core: Node/pod records, CPU share maps, key scheme, config, errors
// No internal nodestore dependencies; every other crate builds on this one.

pub mod config;
pub mod cpu;
pub mod engine;
pub mod error;
pub mod keys;
pub mod node;
pub mod pod;
pub mod retry;

pub use cpu::CpuMap;
pub use error::{Result, StoreError};
pub use node::Node;
pub use pod::Pod;
