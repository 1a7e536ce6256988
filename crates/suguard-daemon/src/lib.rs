//! suguard Daemon Library
//!
//! Core functionality for the suguard decision engine:
//! - Request intake and context resolution
//! - Per-prompt state machine with countdown and secondary authentication
//! - `SQLite` storage for policies and remembered timeout choices
//! - Policy management for already-decided callers

pub mod auth;
pub mod channel;
pub mod clock;
pub mod context;
pub mod management;
pub mod policy;
pub mod request;
pub mod settings;
pub mod storage;

#[cfg(test)]
mod testing;
