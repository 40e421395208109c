use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::db::{MeterRepository, ReadingRepository};
use crate::sheets::{self, SheetClient};
use crate::sync::{SyncEngine, SyncScheduler};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub meters: MeterRepository,
    pub readings: ReadingRepository,
    pub scheduler: Arc<SyncScheduler>,
    pub upload_dir: PathBuf,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        client: Option<Arc<dyn SheetClient>>,
        upload_dir: PathBuf,
    ) -> Self {
        let readings = ReadingRepository::new(pool.clone());
        let engine = SyncEngine::new(Arc::new(readings.clone()), client);

        Self {
            meters: MeterRepository::new(pool),
            readings,
            scheduler: Arc::new(SyncScheduler::new(Arc::new(engine))),
            upload_dir,
            started_at: Instant::now(),
        }
    }

    /// Wires the sheet client described by `config`, if any.
    pub fn from_config(pool: SqlitePool, config: &Config) -> Self {
        let client = sheets::client_from_config(&config.sync);
        Self::new(pool, client, config.upload_dir.value.clone())
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        self.scheduler.engine()
    }
}
