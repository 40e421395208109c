use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::{parse_id, PageQuery};
use crate::models::{InputMethod, Reading, ReadingFilters, ReadingStatistics, ReadingWithMeter};
use crate::server::{ApiError, ApiResponse, AppState, PageInfo};
use crate::validation::{
    parse_reading_date, validate_new_reading, validate_reading_update, ReadingInput,
};

#[derive(Debug, Default, Deserialize)]
pub struct ReadingQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub meter_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub synced_to_sheets: Option<String>,
    pub input_method: Option<String>,
}

impl ReadingQuery {
    fn filters(&self) -> Result<ReadingFilters, ApiError> {
        let date = |raw: &Option<String>, field: &str| -> Result<_, ApiError> {
            raw.as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| {
                    parse_reading_date(s)
                        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {}", field)))
                })
                .transpose()
        };

        Ok(ReadingFilters {
            meter_id: self
                .meter_id
                .as_deref()
                .and_then(|s| s.trim().parse().ok()),
            start_date: date(&self.start_date, "start_date")?,
            end_date: date(&self.end_date, "end_date")?,
            synced_to_sheets: match self.synced_to_sheets.as_deref() {
                Some("true") => Some(true),
                Some("false") => Some(false),
                _ => None,
            },
            input_method: self
                .input_method
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<InputMethod>()
                        .map_err(|_| ApiError::BadRequest("Invalid input_method".to_string()))
                })
                .transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    pub meter_id: Option<String>,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Reading not found".to_string())
}

pub async fn list_readings(
    State(state): State<AppState>,
    query: Result<Query<ReadingQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<ReadingWithMeter>>, ApiError> {
    let Query(query) = query?;
    let filters = query.filters()?;

    let page = state
        .readings
        .find_all(&filters, query.page.pagination())
        .await?;
    let info = PageInfo::from(&page);
    Ok(ApiResponse::ok(page.readings).with_pagination(info))
}

pub async fn reading_statistics(
    State(state): State<AppState>,
    query: Result<Query<StatisticsQuery>, QueryRejection>,
) -> Result<ApiResponse<ReadingStatistics>, ApiError> {
    let Query(query) = query?;
    let meter_id = query
        .meter_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| parse_id(s, "meter"))
        .transpose()?;

    Ok(ApiResponse::ok(state.readings.statistics(meter_id).await?))
}

pub async fn get_reading(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Reading>, ApiError> {
    let id = parse_id(&id, "reading")?;
    let reading = state.readings.get_by_id(id).await?.ok_or_else(not_found)?;
    Ok(ApiResponse::ok(reading))
}

pub async fn create_reading(
    State(state): State<AppState>,
    payload: Result<Json<ReadingInput>, JsonRejection>,
) -> Result<(StatusCode, ApiResponse<Reading>), ApiError> {
    let Json(input) = payload?;
    let new_reading = validate_new_reading(&input, Utc::now())?;

    if !state.meters.exists(new_reading.meter_id).await? {
        return Err(ApiError::NotFound("Meter not found".to_string()));
    }

    let reading = state.readings.create(&new_reading).await?;
    tracing::info!(
        id = reading.id,
        meter_id = reading.meter_id,
        value = reading.value,
        "Reading created"
    );
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(reading).with_message("Reading created"),
    ))
}

pub async fn update_reading(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ReadingInput>, JsonRejection>,
) -> Result<ApiResponse<Reading>, ApiError> {
    let id = parse_id(&id, "reading")?;
    let Json(input) = payload?;
    let update = validate_reading_update(&input, Utc::now())?;

    let reading = state
        .readings
        .update(id, &update)
        .await?
        .ok_or_else(not_found)?;

    tracing::info!(id, "Reading updated");
    Ok(ApiResponse::ok(reading).with_message("Reading updated"))
}

pub async fn delete_reading(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    let id = parse_id(&id, "reading")?;
    if !state.readings.delete(id).await? {
        return Err(not_found());
    }

    tracing::info!(id, "Reading deleted");
    Ok(ApiResponse::message("Reading deleted"))
}
