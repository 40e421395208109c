//! HTTP API for meters, readings, photos, sync and export.

mod error;
mod handlers;
mod router;
mod state;

pub use error::{ApiError, ApiResponse, PageInfo};
pub use router::build_router;
pub use state::AppState;
