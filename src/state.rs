//! Shared application state.
//!
//! One `AppState` is built at startup and shared (via `Arc`) between the
//! poller thread and the HTTP surface. The entity cache sits behind an
//! `RwLock`: read-only while a document is processed, write-locked only
//! for refresh after entity creation.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};

use rusqlite::Connection;

use crate::archive::cache::EntityCache;
use crate::archive::client::ArchiveClient;
use crate::archive::ArchiveError;
use crate::classifier::pipeline::ClassificationPipeline;
use crate::config::Settings;
use crate::reasoning::client::ReasoningClient;
use crate::scheduler::poller::PollerControls;

pub struct AppState {
    pub settings: Settings,
    pub archive: Arc<dyn ArchiveClient>,
    pub cache: Arc<RwLock<EntityCache>>,
    pub db: Arc<Mutex<Connection>>,
    pub pipeline: Arc<ClassificationPipeline>,
    pub poller: Arc<PollerControls>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        archive: Arc<dyn ArchiveClient>,
        reasoning: Arc<dyn ReasoningClient>,
        conn: Connection,
    ) -> Self {
        let cache = Arc::new(RwLock::new(EntityCache::new()));
        let db = Arc::new(Mutex::new(conn));
        let pipeline = Arc::new(ClassificationPipeline::new(
            archive.clone(),
            reasoning,
            cache.clone(),
            db.clone(),
            settings.clone(),
        ));
        Self {
            settings,
            archive,
            cache,
            db,
            pipeline,
            poller: Arc::new(PollerControls::new()),
        }
    }

    pub fn read_cache(&self) -> RwLockReadGuard<'_, EntityCache> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn lock_db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reload the entity cache from the archive and invalidate the
    /// cached system prompt. Called at startup and after every entity
    /// creation.
    pub fn refresh_cache(&self) -> Result<(), ArchiveError> {
        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.refresh(self.archive.as_ref())?;
        }
        self.pipeline.invalidate_prompt();
        Ok(())
    }
}
