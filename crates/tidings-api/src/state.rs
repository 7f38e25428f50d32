//! Shared application state.

use std::sync::Arc;

use sqlx::PgPool;
use tidings_core::clock::{Clock, SystemClock};
use tidings_core::directory::Directories;
use tidings_core::repository::{MessageRepository, ReadCursorRepository};
use tidings_feed::context::FeedSettings;
use tidings_ingest::application::gateway::IngestionGateway;
use tidings_store::{PgDirectory, PgMessageStore};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Message log.
    pub messages: Arc<dyn MessageRepository>,
    /// Read watermarks.
    pub cursors: Arc<dyn ReadCursorRepository>,
    /// Collaborator directories.
    pub directories: Directories,
    /// Settings handed to every page render.
    pub settings: FeedSettings,
    /// Producer entry point for in-process event sources.
    pub gateway: IngestionGateway,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("settings", &self.settings)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        cursors: Arc<dyn ReadCursorRepository>,
        directories: Directories,
        settings: FeedSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let gateway = IngestionGateway::new(
            Arc::clone(&messages),
            Arc::clone(&cursors),
            directories.clone(),
            clock,
        );
        Self {
            messages,
            cursors,
            directories,
            settings,
            gateway,
        }
    }

    /// Create state backed by PostgreSQL.
    #[must_use]
    pub fn from_pool(pool: PgPool, settings: FeedSettings) -> Self {
        let store = Arc::new(PgMessageStore::new(pool.clone()));
        Self::new(
            store.clone(),
            store,
            Directories::from_shared(Arc::new(PgDirectory::new(pool))),
            settings,
            Arc::new(SystemClock),
        )
    }
}
