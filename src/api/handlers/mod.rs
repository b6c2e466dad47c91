pub mod export;
pub mod system;

pub use export::*;
pub use system::*;

use crate::db::{Database, ExportRepository};
use std::sync::Arc;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub export_repo: Arc<ExportRepository>,
    pub db: Arc<Database>,
}
