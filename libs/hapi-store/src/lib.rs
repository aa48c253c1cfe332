//! HAPI Store
//!
//! SQLite persistence for one controller node:
//! - core tables (site, jobs, sequences, pins, assets), stamped for sync
//! - local logs (sensor data, command audit, status snapshots)
//! - core dataset access and transactional merges for synchronization
//!
//! All statements are parameterized; identifiers in generated SQL come from
//! the static table layout in [`schema`].

pub mod error;
pub mod repository;
mod rows;
pub mod schema;
pub mod store;
pub mod sync;

pub use error::{Result, StoreError};
pub use repository::CommandLogEntry;
pub use store::Store;
pub use sync::{fingerprint, validate_core_row, MergeAction};
