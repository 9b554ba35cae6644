//! Persistence layer: libSQL-backed thread status and deal records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{DealRecord, DealStore, DealUpdate, ThreadStatus, ThreadStatusStore, normalize_email};
