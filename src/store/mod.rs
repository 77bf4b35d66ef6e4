//! Persistence layer — SQLite-backed storage for users, profiles, sessions,
//! and task attempts.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, FlashMessage, SessionRecord};
