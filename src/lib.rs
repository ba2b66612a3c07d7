pub use crate::concurrency::TreeLockService;
pub use crate::error::{LockError, LockResult, TreeError};
pub use crate::lock_manager::LockManager;
pub use crate::operation::{LockRequest, LockResponse, Operation, Request};
pub use crate::query::{NodeView, TreeSnapshot};
pub use crate::tree::{NodeId, TreeStore, UserId};

pub mod batch;
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod json_output;
pub mod lock_manager;
pub mod logging;
pub mod metrics;
pub mod operation;
pub mod persist;
pub mod query;
pub mod serve;
pub mod tree;
// Fixtures shared by unit tests, integration tests and benches; not public API
#[doc(hidden)]
pub mod test_utils;
