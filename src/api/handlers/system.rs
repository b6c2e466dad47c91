//! System endpoint handlers

use crate::api::models::{ComponentHealth, HealthResponse, HealthStatus};
use crate::core::error::ExportError;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use super::AppState;

/// Health check endpoint
///
/// Public (not behind the API key) so deployment probes and load balancers
/// can reach it. Reports overall status plus a database connectivity probe.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state
        .db
        .execute(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(ExportError::DatabaseError)
        })
        .await
    {
        Ok(_) => ComponentHealth {
            status: HealthStatus::Healthy,
            message: None,
        },
        Err(e) => {
            tracing::warn!("Health check database probe failed: {}", e);
            ComponentHealth {
                status: HealthStatus::Unhealthy,
                message: Some("database unreachable".to_string()),
            }
        }
    };

    let status = database.status;
    let status_code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().timestamp(),
        database,
    };

    (status_code, Json(response))
}
