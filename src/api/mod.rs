//! REST API module
//!
//! This module provides the HTTP server and the export API surface:
//! - Router assembly and request handling
//! - API key middleware
//! - Trace ID propagation and response formatting

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod server;

pub use middleware::{trace_id_middleware, TraceId, TRACE_ID_HEADER};
pub use server::ApiServer;
