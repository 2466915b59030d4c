use std::sync::Arc;

use storage::repository::Storage;
use storage::sqlite::SqliteOptions;
use tracing::info;

use crate::aggregator::CourseCompletionAggregator;
use crate::config::TrackerConfig;
use crate::error::ProgressServicesError;
use crate::history::WatchHistoryService;
use crate::media::SharedMedia;
use crate::session::PlaybackSession;
use crate::tracker::{ProgressTracker, TrackerBinding, TrackerContext};
use crate::Clock;

/// Assembles progress services over one storage backend.
#[derive(Clone)]
pub struct ProgressServices {
    context: TrackerContext,
    config: TrackerConfig,
    aggregator: Arc<CourseCompletionAggregator>,
    history: Arc<WatchHistoryService>,
}

impl ProgressServices {
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock, config: TrackerConfig) -> Self {
        let config = config.normalized();
        let aggregator = Arc::new(
            CourseCompletionAggregator::new(
                Arc::clone(&storage.catalog),
                Arc::clone(&storage.progress),
            )
            .with_chunk_size(config.query_chunk_size),
        );
        let history = Arc::new(
            WatchHistoryService::new(Arc::clone(&storage.progress), Arc::clone(&storage.catalog))
                .with_default_limit(config.recent_limit),
        );

        Self {
            context: TrackerContext::from_storage(clock, storage),
            config,
            aggregator,
            history,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// The pool is sized by `config.db_max_connections`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServicesError` if connecting or migrating fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: TrackerConfig,
    ) -> Result<Self, ProgressServicesError> {
        let config = config.normalized();
        let options = SqliteOptions::default().with_max_connections(config.db_max_connections);
        let storage = Storage::sqlite_with(db_url, options).await?;
        info!(
            save_interval_secs = config.save_interval.as_secs(),
            db_max_connections = config.db_max_connections,
            "progress services ready"
        );
        Ok(Self::new(&storage, clock, config))
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(&Storage::in_memory(), clock, TrackerConfig::default())
    }

    /// A tracker bound to `binding`; nothing is read until `load` runs.
    #[must_use]
    pub fn tracker(&self, binding: TrackerBinding, media: Option<SharedMedia>) -> ProgressTracker {
        ProgressTracker::new(self.context.clone(), binding, media)
    }

    /// Spawn a playback session that saves on the configured interval.
    #[must_use]
    pub fn start_session(&self, binding: TrackerBinding, media: SharedMedia) -> PlaybackSession {
        PlaybackSession::start(self.tracker(binding, Some(media)), self.config.save_interval)
    }

    #[must_use]
    pub fn aggregator(&self) -> Arc<CourseCompletionAggregator> {
        Arc::clone(&self.aggregator)
    }

    #[must_use]
    pub fn history(&self) -> Arc<WatchHistoryService> {
        Arc::clone(&self.history)
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}
