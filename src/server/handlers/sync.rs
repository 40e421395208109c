use axum::extract::State;

use crate::server::{ApiError, ApiResponse, AppState};
use crate::sheets::SheetInfo;
use crate::sync::{SyncReport, SyncStatus, SyncTrigger};

const NOT_CONFIGURED: &str = "Google Sheets is not configured";

/// Runs one manual sync cycle.
pub async fn trigger_sync(
    State(state): State<AppState>,
) -> Result<ApiResponse<SyncReport>, ApiError> {
    let engine = state.engine();
    if !engine.is_configured() {
        return Err(ApiError::Unavailable(NOT_CONFIGURED.to_string()));
    }

    let outcome = engine.perform_sync(SyncTrigger::Manual).await?;
    let total_unsynced = state.readings.count_unsynced().await?;

    let message = if outcome.synced_count == 0 {
        "No new readings to sync".to_string()
    } else {
        format!("{} readings synced to Google Sheets", outcome.synced_count)
    };
    Ok(ApiResponse::ok(SyncReport {
        synced_count: outcome.synced_count,
        total_unsynced,
    })
    .with_message(message))
}

pub async fn sync_status(
    State(state): State<AppState>,
) -> Result<ApiResponse<SyncStatus>, ApiError> {
    let engine = state.engine();

    let sheets_info = match engine.client() {
        Some(client) => match client.destination_info().await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(error = %e, "Could not get Google Sheets info");
                None
            }
        },
        None => None,
    };

    Ok(ApiResponse::ok(SyncStatus {
        google_sheets_configured: engine.is_configured(),
        auto_sync_enabled: state.scheduler.is_active(),
        next_sync_time: state.scheduler.next_sync_time(),
        unsynced_count: state.readings.count_unsynced().await?,
        sheets_info,
    }))
}

pub async fn test_connection(
    State(state): State<AppState>,
) -> Result<ApiResponse<Option<SheetInfo>>, ApiError> {
    let Some(client) = state.engine().client() else {
        return Err(ApiError::Unavailable(NOT_CONFIGURED.to_string()));
    };

    if !client.test_connection().await {
        return Err(ApiError::Unavailable(
            "Connection to Google Sheets failed".to_string(),
        ));
    }

    let info = client.destination_info().await.ok();
    Ok(ApiResponse::ok(info).with_message("Connection to Google Sheets successful"))
}
