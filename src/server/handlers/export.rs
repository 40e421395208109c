use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::Local;

use crate::export::{build_workbook, export_filename, ExportData, XLSX_CONTENT_TYPE};
use crate::server::{ApiError, AppState};

/// Streams the full Excel export as an attachment.
pub async fn export_excel(State(state): State<AppState>) -> Result<Response, ApiError> {
    let data = ExportData::collect(&state.meters, &state.readings).await?;
    let bytes = tokio::task::spawn_blocking(move || build_workbook(&data)).await??;

    let filename = export_filename(Local::now());
    tracing::info!(file = %filename, "Excel export completed");

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}
