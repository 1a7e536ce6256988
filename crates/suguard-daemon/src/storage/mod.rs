//! `SQLite` storage for suguard.
//!
//! Provides persistence for superuser policies and remembered timeout choices.

mod db;
mod models;
mod queries;
mod store;

pub use db::{Database, DatabaseError};
pub use models::{PolicyRow, TimeoutChoiceRow};
pub use store::{PolicyStore, TimeoutChoiceStore};
