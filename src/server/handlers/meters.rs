use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::{parse_id, PageQuery};
use crate::models::{Meter, MeterWithLatestReading, ReadingWithMeter};
use crate::server::{ApiError, ApiResponse, AppState, PageInfo};
use crate::validation::{validate_meter_update, validate_new_meter, MeterInput};

const DUPLICATE_NAME: &str = "A meter with this name already exists";

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn not_found() -> ApiError {
    ApiError::NotFound("Meter not found".to_string())
}

pub async fn list_meters(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<MeterWithLatestReading>>, ApiError> {
    Ok(ApiResponse::ok(state.meters.list().await?))
}

pub async fn get_meter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Meter>, ApiError> {
    let id = parse_id(&id, "meter")?;
    let meter = state.meters.get_by_id(id).await?.ok_or_else(not_found)?;
    Ok(ApiResponse::ok(meter))
}

pub async fn create_meter(
    State(state): State<AppState>,
    payload: Result<Json<MeterInput>, JsonRejection>,
) -> Result<(StatusCode, ApiResponse<Meter>), ApiError> {
    let Json(input) = payload?;
    let new_meter = validate_new_meter(&input)?;

    if state.meters.get_by_name(&new_meter.name).await?.is_some() {
        return Err(ApiError::Conflict(DUPLICATE_NAME.to_string()));
    }

    let meter = state.meters.create(&new_meter).await.map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict(DUPLICATE_NAME.to_string())
        } else {
            e.into()
        }
    })?;

    tracing::info!(id = meter.id, name = %meter.name, "Meter created");
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(meter).with_message("Meter created"),
    ))
}

pub async fn update_meter(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<MeterInput>, JsonRejection>,
) -> Result<ApiResponse<Meter>, ApiError> {
    let id = parse_id(&id, "meter")?;
    let Json(input) = payload?;
    let update = validate_meter_update(&input)?;

    if !state.meters.exists(id).await? {
        return Err(not_found());
    }
    if let Some(name) = &update.name {
        if let Some(other) = state.meters.get_by_name(name).await? {
            if other.id != id {
                return Err(ApiError::Conflict(DUPLICATE_NAME.to_string()));
            }
        }
    }

    let meter = state
        .meters
        .update(id, &update)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict(DUPLICATE_NAME.to_string())
            } else {
                e.into()
            }
        })?
        .ok_or_else(not_found)?;

    tracing::info!(id, "Meter updated");
    Ok(ApiResponse::ok(meter).with_message("Meter updated"))
}

pub async fn delete_meter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    let id = parse_id(&id, "meter")?;
    if !state.meters.delete(id).await? {
        return Err(not_found());
    }

    tracing::info!(id, "Meter deleted");
    Ok(ApiResponse::message("Meter deleted"))
}

pub async fn meter_readings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<ReadingWithMeter>>, ApiError> {
    let id = parse_id(&id, "meter")?;
    let Query(query) = query?;

    if !state.meters.exists(id).await? {
        return Err(not_found());
    }

    let page = state.readings.find_by_meter(id, query.pagination()).await?;
    let info = PageInfo::from(&page);
    Ok(ApiResponse::ok(page.readings).with_pagination(info))
}
