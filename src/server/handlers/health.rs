use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::server::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

pub async fn api_info() -> Json<Value> {
    Json(json!({
        "name": "meterlog",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "meters": "/api/meters",
            "readings": "/api/readings",
            "statistics": "/api/readings/statistics",
            "upload": "/api/upload/image",
            "images": "/api/images/{filename}",
            "sync": "/api/sync/sheets",
            "sync_status": "/api/sync/status",
            "sync_test": "/api/sync/test",
            "export": "/api/sync/export/excel",
        }
    }))
}
