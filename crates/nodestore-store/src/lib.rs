// nodestore-store: Pod and node repositories, CPU ledger, marshaling views
// Depends on nodestore-kv (records, locks) and nodestore-engine (live clients)

pub mod ledger;
pub mod nodes;
pub mod pods;
pub mod store;
pub mod view;

pub use ledger::CpuOp;
pub use nodes::{NewNode, PartialNodes, TlsMaterial};
pub use store::Store;
pub use view::{NodeView, PodView};
