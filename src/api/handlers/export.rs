//! Export endpoint handler

use crate::api::models::{to_csv, to_json_rows, ExportFormat};
use crate::core::error::Result;
use crate::db::ExportFilter;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;

use super::AppState;

/// Handler for GET /export
///
/// Negotiates the output format, translates the recognized filter parameters
/// into the parameterized export query, executes it, and serializes the full
/// result set. The format is validated before any database work so a caller
/// mistake never costs a query.
pub async fn export(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let format = ExportFormat::from_params(&params)?;
    let filter = ExportFilter::from_params(&params);

    let result = state.export_repo.fetch(&filter).await?;

    tracing::info!(
        rows = result.len(),
        format = ?format,
        "Export query executed"
    );

    match format {
        ExportFormat::Csv => {
            let body = to_csv(&result)?;
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"export.csv\"",
                    ),
                ],
                body,
            )
                .into_response())
        }
        ExportFormat::Json => Ok(Json(to_json_rows(&result)).into_response()),
    }
}
