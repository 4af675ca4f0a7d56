// nodestore-kv: Typed KV adapter and TTL-bound distributed locks
// Depends on nodestore-core (errors, key scheme)

pub mod etcd;
pub mod lock;
pub mod memory;
pub mod store;
pub mod testing;

pub use etcd::EtcdStore;
pub use lock::{DistributedLock, LockProvider, LockRelease, LockWait};
pub use memory::MemoryStore;
pub use store::{KvNode, KvStore};
