//! Persistence layer: durable libSQL store, in-memory fallback, and the
//! thread/user/approval stores built on top of them.

pub mod approvals;
pub mod durable;
pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod threads;
pub mod traits;
pub mod users;

pub use approvals::{ApprovalStore, PendingApproval};
pub use durable::DurableHandle;
pub use libsql_backend::LibSqlBackend;
pub use memory::FallbackStore;
pub use threads::{ReplayReport, StorageResult, ThreadStore};
pub use traits::DurableStore;
pub use users::{UserRegistry, UserSync};
