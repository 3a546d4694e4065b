//! Application context - dependency wiring for the daemon

use std::sync::Arc;
use std::time::Duration;

use calbridge_core::{BindingStore, CalendarPort, SyncEngine, SyncSettings, TrackerPort};
use calbridge_domain::{CalBridgeError, Config, Result};
use calbridge_infra::{
    DbManager, GoogleCalendarClient, SqliteBindingStore, SyncJob, SyncScheduler,
    SyncSchedulerConfig, TokenManager, YouTrackClient,
};
use tokio::sync::Mutex;
use tracing::info;

/// Application context - owns the store, the adapters, the engine and the
/// scheduler for the lifetime of the process.
pub struct AppContext {
    db: Arc<DbManager>,
    engine: Arc<SyncEngine>,
    scheduler: Mutex<SyncScheduler>,
}

impl AppContext {
    /// Build the full dependency graph from configuration (fail-fast).
    pub async fn new(config: Config) -> Result<Self> {
        // Binding store
        let db = Arc::new(DbManager::new(&config.database.path, config.database.pool_size)?);
        db.run_migrations()?;
        db.health_check()?;
        let store: Arc<dyn BindingStore> = Arc::new(SqliteBindingStore::new(Arc::clone(&db)));

        // Calendar side; first run triggers the interactive console grant.
        let tokens = Arc::new(TokenManager::new(&config.calendar)?);
        tokens.ensure_authorized().await?;
        let calendar: Arc<dyn CalendarPort> =
            Arc::new(GoogleCalendarClient::new(Arc::clone(&tokens))?);

        // Tracker side
        let tracker: Arc<dyn TrackerPort> = Arc::new(YouTrackClient::new(&config.tracker)?);

        let settings = SyncSettings {
            calendar_id: config.calendar.calendar_id.clone(),
            write_project_id: config.tracker.write_project_id.clone(),
            query_project_id: config.tracker.query_project_id().to_string(),
        };
        let engine = Arc::new(SyncEngine::new(calendar, tracker, store, settings));

        let scheduler_config = SyncSchedulerConfig {
            interval: Duration::from_secs(config.sync.interval_seconds.max(1)),
            ..SyncSchedulerConfig::default()
        };
        let job: Arc<dyn SyncJob> = Arc::clone(&engine) as Arc<dyn SyncJob>;
        let scheduler = Mutex::new(SyncScheduler::new(job, scheduler_config));

        info!(
            calendar_id = %config.calendar.calendar_id,
            write_project = %config.tracker.write_project_id,
            query_project = %config.tracker.query_project_id(),
            interval_secs = config.sync.interval_seconds,
            "application context initialised"
        );

        Ok(Self { db, engine, scheduler })
    }

    /// The sync engine, for running a synchronization outside the scheduler.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Start the periodic sync loop.
    pub async fn start(&self) -> Result<()> {
        self.scheduler
            .lock()
            .await
            .start()
            .await
            .map_err(CalBridgeError::from)
    }

    /// Stop the scheduler and release the store.
    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler
            .lock()
            .await
            .stop()
            .await
            .map_err(CalBridgeError::from)?;
        info!(db_path = %self.db.path().display(), "application context shut down");
        Ok(())
    }
}
