use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{SyncEngine, SyncTrigger};
use crate::config::MAX_SYNC_INTERVAL_MINUTES;

/// Delay between `start` and the first scheduled cycle.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(30);

struct RunningTimer {
    stop_tx: watch::Sender<bool>,
    next_fire: watch::Receiver<Option<DateTime<Utc>>>,
    handle: JoinHandle<()>,
}

/// Drives scheduled sync cycles from a single background task.
///
/// Stopping only prevents future cycles; a cycle already running completes.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    initial_delay: Duration,
    timer: Mutex<Option<RunningTimer>>,
    stopped: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            initial_delay: DEFAULT_INITIAL_DELAY,
            timer: Mutex::new(None),
            stopped: Mutex::new(Vec::new()),
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Schedules a cycle after the initial delay and then every `interval_minutes`,
    /// clamped to between one minute and one week.
    pub fn start(&self, interval_minutes: u64) {
        let minutes = interval_minutes.clamp(1, MAX_SYNC_INTERVAL_MINUTES);
        self.start_every(Duration::from_secs(minutes * 60));
    }

    pub fn start_every(&self, interval: Duration) {
        let mut timer = lock(&self.timer);
        if timer.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            tracing::warn!("Sync scheduler already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (next_tx, next_fire) = watch::channel(None);
        let handle = tokio::spawn(run_timer(
            self.engine.clone(),
            self.initial_delay,
            interval,
            stop_rx,
            next_tx,
        ));

        tracing::info!(
            interval_secs = interval.as_secs(),
            initial_delay_secs = self.initial_delay.as_secs(),
            "Sync scheduler started"
        );
        *timer = Some(RunningTimer {
            stop_tx,
            next_fire,
            handle,
        });
    }

    /// Cancels future cycles. Idempotent.
    pub fn stop(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            let _ = timer.stop_tx.send(true);
            let mut stopped = lock(&self.stopped);
            stopped.retain(|handle| !handle.is_finished());
            stopped.push(timer.handle);
            tracing::info!("Sync scheduler stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn next_sync_time(&self) -> Option<DateTime<Utc>> {
        lock(&self.timer)
            .as_ref()
            .and_then(|t| *t.next_fire.borrow())
    }

    /// Stops the timer and waits for any in-flight cycle to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let handles: Vec<_> = lock(&self.stopped).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Sync scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_timer(
    engine: Arc<SyncEngine>,
    initial_delay: Duration,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
    next_tx: watch::Sender<Option<DateTime<Utc>>>,
) {
    let mut next_at = Instant::now() + initial_delay;

    loop {
        let until = next_at.saturating_duration_since(Instant::now());
        let wall_clock = chrono::Duration::from_std(until)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
        let _ = next_tx.send(wall_clock);

        tokio::select! {
            _ = tokio::time::sleep_until(next_at) => {}
            _ = stop_rx.changed() => break,
        }
        if *stop_rx.borrow() {
            break;
        }

        if let Err(e) = engine.perform_sync(SyncTrigger::Scheduled).await {
            tracing::error!(error = %e, "Scheduled sync failed");
        }

        next_at += interval;
        let now = Instant::now();
        while next_at <= now {
            next_at += interval;
        }
    }

    let _ = next_tx.send(None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::SheetClient;
    use crate::sync::testing::{day, reading, FakeSheet, FakeStore};
    use std::sync::atomic::Ordering;

    fn scheduler(
        store: &Arc<FakeStore>,
        sheet: &Arc<FakeSheet>,
        initial_delay: Duration,
    ) -> SyncScheduler {
        let engine = SyncEngine::new(store.clone(), Some(sheet.clone() as Arc<dyn SheetClient>));
        SyncScheduler::new(Arc::new(engine)).with_initial_delay(initial_delay)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_stop_before_initial_delay_runs_nothing() {
        let store = Arc::new(FakeStore::with_readings(vec![reading(1, day(1))]));
        let sheet = Arc::new(FakeSheet::default());
        let scheduler = scheduler(&store, &sheet, Duration::from_millis(50));

        scheduler.start(1);
        assert!(scheduler.is_active());
        scheduler.stop();
        assert!(!scheduler.is_active());
        assert!(scheduler.next_sync_time().is_none());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.find_calls.load(Ordering::SeqCst), 0);
        assert!(sheet.appended().is_empty());
    }

    #[tokio::test]
    async fn test_first_cycle_runs_after_initial_delay() {
        let store = Arc::new(FakeStore::with_readings(vec![reading(1, day(1))]));
        let sheet = Arc::new(FakeSheet::default());
        let scheduler = scheduler(&store, &sheet, Duration::from_millis(20));

        scheduler.start(60);
        assert!(wait_for(|| store.synced_ids() == vec![1]).await);
        assert_eq!(store.limits.lock().unwrap()[0], 100);

        // Next fire is a full interval away once the first cycle is done
        assert!(
            wait_for(|| scheduler
                .next_sync_time()
                .is_some_and(|t| t > Utc::now() + chrono::Duration::minutes(59)))
            .await
        );
        assert!(scheduler.is_active());
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_next_sync_time_tracks_initial_delay() {
        let store = Arc::new(FakeStore::default());
        let sheet = Arc::new(FakeSheet::default());
        let scheduler = scheduler(&store, &sheet, Duration::from_secs(30));

        assert!(scheduler.next_sync_time().is_none());
        scheduler.start(60);

        assert!(wait_for(|| scheduler.next_sync_time().is_some()).await);
        let next = scheduler.next_sync_time().unwrap();
        assert!(next > Utc::now() + chrono::Duration::seconds(25));
        assert!(next <= Utc::now() + chrono::Duration::seconds(30));
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let store = Arc::new(FakeStore::default());
        let sheet = Arc::new(FakeSheet::default());
        let scheduler = scheduler(&store, &sheet, Duration::from_millis(30));

        scheduler.start(60);
        scheduler.start(1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        // One timer, one initial cycle
        assert_eq!(store.find_calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.next_sync_time().unwrap() > Utc::now() + chrono::Duration::minutes(59));
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_restartable() {
        let store = Arc::new(FakeStore::default());
        let sheet = Arc::new(FakeSheet::default());
        let scheduler = scheduler(&store, &sheet, Duration::from_millis(10));

        scheduler.stop();
        scheduler.start(60);
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_active());

        scheduler.start(60);
        assert!(scheduler.is_active());
        assert!(wait_for(|| store.find_calls.load(Ordering::SeqCst) == 1).await);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_timer() {
        let store = Arc::new(FakeStore::with_readings(vec![reading(1, day(1))]));
        let sheet = Arc::new(FakeSheet::default());
        sheet.fail_append.store(true, Ordering::SeqCst);
        let scheduler = scheduler(&store, &sheet, Duration::from_millis(5));

        scheduler.start_every(Duration::from_millis(20));
        assert!(wait_for(|| sheet.probes.load(Ordering::SeqCst) >= 3).await);
        assert!(scheduler.is_active());
        assert!(store.synced_ids().is_empty());

        sheet.fail_append.store(false, Ordering::SeqCst);
        assert!(wait_for(|| store.synced_ids() == vec![1]).await);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_oversized_interval_is_clamped() {
        let store = Arc::new(FakeStore::default());
        let sheet = Arc::new(FakeSheet::default());
        let scheduler = scheduler(&store, &sheet, Duration::from_millis(5));

        scheduler.start(u64::MAX);
        assert!(wait_for(|| store.find_calls.load(Ordering::SeqCst) == 1).await);
        assert!(
            wait_for(|| scheduler
                .next_sync_time()
                .is_some_and(|t| t > Utc::now() + chrono::Duration::days(6)))
            .await
        );
        assert!(scheduler.next_sync_time().unwrap() <= Utc::now() + chrono::Duration::days(7));
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_restarts_keep_only_unfinished_handles() {
        let store = Arc::new(FakeStore::default());
        let sheet = Arc::new(FakeSheet::default());
        let scheduler = scheduler(&store, &sheet, Duration::from_secs(30));

        for _ in 0..20 {
            scheduler.start(60);
            scheduler.stop();
            assert!(wait_for(|| lock(&scheduler.stopped).iter().all(|h| h.is_finished())).await);
        }
        assert_eq!(lock(&scheduler.stopped).len(), 1);

        scheduler.shutdown().await;
        assert!(lock(&scheduler.stopped).is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_cycle() {
        let store = Arc::new(FakeStore::with_readings(vec![reading(1, day(1))]));
        let sheet = Arc::new(FakeSheet {
            append_delay: Duration::from_millis(200),
            ..Default::default()
        });
        let scheduler = scheduler(&store, &sheet, Duration::from_millis(5));

        scheduler.start(60);
        assert!(wait_for(|| sheet.in_flight.load(Ordering::SeqCst) == 1).await);

        scheduler.shutdown().await;
        assert_eq!(sheet.appended(), vec![1]);
        assert_eq!(store.synced_ids(), vec![1]);
        assert!(!scheduler.is_active());
    }
}
