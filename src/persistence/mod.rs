//! Persistence adapter seam: everything the engine durably stores.
//!
//! Renamed from this codebase's `storage` module — same trait-object-over-
//! `#[async_trait]` shape, retargeted at check results and notification
//! state instead of resource metrics.

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;

#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::PersistenceBackend;
pub use error::{PersistenceError, PersistenceResult};
