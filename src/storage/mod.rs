//! Storage Layer
//!
//! Handles all data persistence: the SQLite engine, schema migrations,
//! backups, store access scheduling and JSON config.

pub mod backup;
pub mod config;
pub mod database;
pub mod migrations;
pub mod scheduler;

pub use config::*;
pub use database::*;
pub use migrations::{latest_schema_version, Migration, MigrationManager, MigrationReport, SchemaVersionRow};
pub use scheduler::AccessGate;
