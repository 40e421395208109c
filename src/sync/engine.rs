use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use super::{SyncOutcome, SyncTrigger, UnsyncedStore};
use crate::sheets::{SheetClient, SheetError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Google Sheets connection test failed")]
    Unreachable,
    #[error("failed to write to Google Sheets: {0}")]
    Remote(#[from] SheetError),
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Runs sync cycles: fetch unsynced readings, append them remotely, flag them.
///
/// Cycles are serialized. A caller arriving while a cycle is in flight waits
/// for it and then runs its own cycle against the remaining readings.
pub struct SyncEngine {
    store: Arc<dyn UnsyncedStore>,
    client: Option<Arc<dyn SheetClient>>,
    cycle_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn UnsyncedStore>, client: Option<Arc<dyn SheetClient>>) -> Self {
        Self {
            store,
            client,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&Arc<dyn SheetClient>> {
        self.client.as_ref()
    }

    pub async fn perform_sync(&self, trigger: SyncTrigger) -> Result<SyncOutcome, SyncError> {
        let Some(client) = &self.client else {
            tracing::debug!(%trigger, "Google Sheets not configured, skipping sync");
            return Ok(SyncOutcome { synced_count: 0 });
        };

        let _cycle = self.cycle_lock.lock().await;

        let batch = self.store.find_unsynced(trigger.batch_size()).await?;
        if batch.is_empty() {
            tracing::info!(%trigger, "No unsynced readings");
            return Ok(SyncOutcome { synced_count: 0 });
        }

        tracing::info!(%trigger, count = batch.len(), "Starting sync to Google Sheets");

        if !client.test_connection().await {
            tracing::error!(%trigger, "Sync aborted, Google Sheets is unreachable");
            return Err(SyncError::Unreachable);
        }

        if let Err(e) = client.append_rows(&batch).await {
            tracing::error!(%trigger, error = %e, "Sync failed, no readings were marked");
            return Err(e.into());
        }

        let ids: Vec<i64> = batch.iter().map(|r| r.reading.id).collect();
        let marked = self.store.mark_as_synced(&ids).await.map_err(|e| {
            tracing::error!(
                %trigger,
                error = %e,
                count = ids.len(),
                "Rows appended but marking failed; they will be sent again"
            );
            e
        })?;

        tracing::info!(%trigger, count = ids.len(), marked, "Synced readings to Google Sheets");
        Ok(SyncOutcome {
            synced_count: ids.len(),
        })
    }
}
