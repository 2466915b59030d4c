use std::sync::Arc;

use progress_core::model::{UserId, Video};
use storage::repository::{CatalogRepository, ProgressRepository};
use tracing::debug;

use crate::config::DEFAULT_RECENT_LIMIT;
use crate::error::HistoryError;

/// Lists the videos a user touched most recently.
#[derive(Clone)]
pub struct WatchHistoryService {
    progress: Arc<dyn ProgressRepository>,
    catalog: Arc<dyn CatalogRepository>,
    default_limit: u32,
}

impl WatchHistoryService {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressRepository>, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            progress,
            catalog,
            default_limit: DEFAULT_RECENT_LIMIT,
        }
    }

    #[must_use]
    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit.max(1);
        self
    }

    /// Videos ordered by the latest progress write, newest first.
    ///
    /// Records whose video has been removed from the catalog are skipped, so
    /// the result may be shorter than `limit`.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` if either repository query fails.
    pub async fn recently_watched(
        &self,
        user_id: &UserId,
        limit: Option<u32>,
    ) -> Result<Vec<Video>, HistoryError> {
        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let records = self.progress.list_recent(user_id, limit).await?;
        let mut videos = Vec::with_capacity(records.len());
        for record in &records {
            match self.catalog.get_video(record.video_id()).await? {
                Some(video) => videos.push(video),
                None => debug!(video_id = %record.video_id(), "recent video no longer in catalog"),
            }
        }
        Ok(videos)
    }
}
