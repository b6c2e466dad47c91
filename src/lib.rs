//! Attendance Export Backend Library
//!
//! This library provides the functionality for the school attendance export
//! service: configuration, database access, and the REST API surface.

pub mod api;
pub mod core;
pub mod db;

// Re-export commonly used types
pub use api::ApiServer;
pub use crate::core::Config;
pub use db::Database;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the library
pub type Result<T> = anyhow::Result<T>;
