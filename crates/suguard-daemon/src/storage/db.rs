//! Database connection and initialization.

pub use suguard_core::db::DatabaseError;

suguard_core::define_database!(Database, "Policy database migrations complete");
