//! Persistence layer: SQLite log and the content-addressed blob store

pub mod files;
pub mod sqlite;

pub use files::BlobStore;
pub use sqlite::SqliteService;
