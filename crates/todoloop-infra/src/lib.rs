//! Infrastructure layer for todoloop.
//!
//! Contains the SQLite implementation of the unit of work and repository
//! traits defined in `todoloop-core`, plus the TOML configuration loader.

pub mod config;
pub mod sqlite;
