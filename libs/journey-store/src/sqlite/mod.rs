//! Embedded SQLite backend.

pub mod repository;
pub mod schema;

pub use repository::{RelationalStore, DB_FILE};
pub use schema::SCHEMA_VERSION;
