use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::path::Path;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::handlers::{export, health, meters, readings, sync, upload};
use super::AppState;
use crate::images::MAX_UPLOAD_BYTES;

/// Multipart framing on top of the image itself.
const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 64 * 1024;

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health::api_info))
        .route("/meters", get(meters::list_meters).post(meters::create_meter))
        .route(
            "/meters/{id}",
            get(meters::get_meter)
                .put(meters::update_meter)
                .delete(meters::delete_meter),
        )
        .route("/meters/{id}/readings", get(meters::meter_readings))
        .route(
            "/readings",
            get(readings::list_readings).post(readings::create_reading),
        )
        .route("/readings/statistics", get(readings::reading_statistics))
        .route(
            "/readings/{id}",
            get(readings::get_reading)
                .put(readings::update_reading)
                .delete(readings::delete_reading),
        )
        .route(
            "/upload/image",
            post(upload::upload_image).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/images/{filename}", get(upload::get_image))
        .route("/sync/sheets", post(sync::trigger_sync))
        .route("/sync/status", get(sync::sync_status))
        .route("/sync/test", get(sync::test_connection))
        .route("/sync/export/excel", get(export::export_excel))
}

fn cors_layer(origin: &str) -> Option<CorsLayer> {
    match origin.parse::<HeaderValue>() {
        Ok(origin) => Some(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers(Any),
        ),
        Err(_) => {
            tracing::warn!(origin, "Invalid CORS origin, cross-origin requests disabled");
            None
        }
    }
}

/// Builds the application router. `static_dir`, when set, serves a built web
/// UI for every path the API does not claim.
pub fn build_router(state: AppState, cors_origin: &str, static_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health))
        .nest("/api", api_routes());

    if let Some(dir) = static_dir {
        tracing::info!(dir = %dir.display(), "Serving static files");
        router = router
            .fallback_service(ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))));
    }

    let mut router = router
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if let Some(cors) = cors_layer(cors_origin) {
        router = router.layer(cors);
    }
    router
}
