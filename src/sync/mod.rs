//! Pushing unsynced readings to the remote sheet, on demand and on a timer.

mod engine;
mod scheduler;

pub use engine::{SyncEngine, SyncError};
pub use scheduler::SyncScheduler;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::ReadingRepository;
use crate::models::ReadingWithMeter;
use crate::sheets::SheetInfo;

/// Batch size for timer-driven cycles.
pub const SCHEDULED_BATCH_SIZE: i64 = 100;
/// Batch size for cycles requested by a user.
pub const MANUAL_BATCH_SIZE: i64 = 1000;

/// What started a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Scheduled,
    Manual,
}

impl SyncTrigger {
    pub fn batch_size(self) -> i64 {
        match self {
            SyncTrigger::Scheduled => SCHEDULED_BATCH_SIZE,
            SyncTrigger::Manual => MANUAL_BATCH_SIZE,
        }
    }
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncTrigger::Scheduled => write!(f, "scheduled"),
            SyncTrigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub synced_count: usize,
}

/// Result of a manual sync as reported over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub synced_count: usize,
    pub total_unsynced: i64,
}

/// Sync state of a running server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub google_sheets_configured: bool,
    pub auto_sync_enabled: bool,
    pub next_sync_time: Option<DateTime<Utc>>,
    pub unsynced_count: i64,
    pub sheets_info: Option<SheetInfo>,
}

/// The slice of the reading store the sync engine depends on.
#[async_trait]
pub trait UnsyncedStore: Send + Sync {
    async fn find_unsynced(&self, limit: i64) -> Result<Vec<ReadingWithMeter>, sqlx::Error>;
    async fn mark_as_synced(&self, ids: &[i64]) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl UnsyncedStore for ReadingRepository {
    async fn find_unsynced(&self, limit: i64) -> Result<Vec<ReadingWithMeter>, sqlx::Error> {
        ReadingRepository::find_unsynced(self, limit).await
    }

    async fn mark_as_synced(&self, ids: &[i64]) -> Result<u64, sqlx::Error> {
        ReadingRepository::mark_as_synced(self, ids).await
    }
}
