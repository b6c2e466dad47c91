//! Database module
//!
//! Connection pool management, schema migrations, and the export query
//! repository.

pub mod export;
pub mod manager;
pub mod migrations;

pub use export::{ExportFilter, ExportRepository, ResultSet};
pub use manager::Database;
