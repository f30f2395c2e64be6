/// Database abstraction layer
///
/// Monitors, probe history, incidents and the audit log live in a libsql
/// (SQLite) database reached through a pooled connection.

pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Database, DatabaseImpl, ProbeApplied};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
