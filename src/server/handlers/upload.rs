use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::images::{self, MAX_UPLOAD_BYTES};
use crate::server::{ApiError, ApiResponse, AppState};
use crate::validation::parse_positive_id;

#[derive(Debug, Serialize)]
pub struct UploadedImage {
    pub filename: String,
    pub filepath: String,
    pub meter_id: i64,
    pub size: usize,
    pub original_name: Option<String>,
}

struct ImageField {
    bytes: Vec<u8>,
    original_name: Option<String>,
}

pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<ApiResponse<UploadedImage>, ApiError> {
    let mut image: Option<ImageField> = None;
    let mut meter_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let is_image = field
                    .content_type()
                    .is_some_and(|ct| ct.starts_with("image/"));
                if !is_image {
                    return Err(ApiError::BadRequest(
                        "Only image files are allowed".to_string(),
                    ));
                }
                let original_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                if bytes.len() > MAX_UPLOAD_BYTES {
                    return Err(ApiError::PayloadTooLarge(
                        "Image is larger than 10 MB".to_string(),
                    ));
                }
                image = Some(ImageField {
                    bytes: bytes.to_vec(),
                    original_name,
                });
            }
            Some("meter_id") => meter_id = Some(field.text().await?),
            _ => {}
        }
    }

    let image = image.ok_or_else(|| ApiError::BadRequest("No file was uploaded".to_string()))?;
    let meter_id = match meter_id {
        Some(raw) => parse_positive_id(&raw).map_err(|e| ApiError::Validation(vec![e]))?,
        None => return Err(ApiError::Validation(vec!["meter_id is required".to_string()])),
    };

    if !state.meters.exists(meter_id).await? {
        return Err(ApiError::NotFound("Meter not found".to_string()));
    }

    let size = image.bytes.len();
    let filename = images::store_meter_image(&state.upload_dir, meter_id, image.bytes).await?;

    Ok(ApiResponse::ok(UploadedImage {
        filepath: format!("/api/images/{}", filename),
        filename,
        meter_id,
        size,
        original_name: image.original_name,
    }))
}

pub async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    if !images::is_safe_filename(&filename) {
        return Err(ApiError::BadRequest("Invalid filename".to_string()));
    }

    let path = images::find_image(&state.upload_dir, &filename)
        .await
        .ok_or_else(|| ApiError::NotFound("Image not found".to_string()))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Image(e.into()))?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], Body::from(bytes)).into_response())
}
