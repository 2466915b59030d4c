use async_trait::async_trait;
use progress_core::model::{CourseId, ProgressRecord, ProgressUpdate, UserId, Video, VideoId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Largest id list accepted by a single `in` filter.
///
/// Callers with longer rosters must split them into chunks of this size.
pub const MAX_IN_FILTER: usize = 10;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("`in` filter accepts at most {limit} ids, got {requested}")]
    QueryLimit { requested: usize, limit: usize },
}

/// Identity of a progress record plus the denormalized course it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgressKey {
    pub user_id: UserId,
    pub video_id: VideoId,
    pub course_id: CourseId,
}

impl ProgressKey {
    #[must_use]
    pub fn new(user_id: UserId, video_id: VideoId, course_id: CourseId) -> Self {
        Self {
            user_id,
            video_id,
            course_id,
        }
    }
}

pub(crate) fn check_in_filter(ids: &[VideoId]) -> Result<(), StorageError> {
    if ids.len() > MAX_IN_FILTER {
        return Err(StorageError::QueryLimit {
            requested: ids.len(),
            limit: MAX_IN_FILTER,
        });
    }
    Ok(())
}

/// Repository contract for per-user watch progress.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for a (user, video) pair.
    ///
    /// Returns `Ok(None)` when the user has never opened the video.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_progress(
        &self,
        user_id: &UserId,
        video_id: &VideoId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Insert a record unless one already exists for the pair.
    ///
    /// Returns `true` when this call created the record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn create_progress(&self, record: &ProgressRecord) -> Result<bool, StorageError>;

    /// Merge a partial update into the record, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn merge_progress(
        &self,
        key: &ProgressKey,
        update: &ProgressUpdate,
    ) -> Result<(), StorageError>;

    /// Count completed records for the user in a course among `video_ids`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::QueryLimit` if more than `MAX_IN_FILTER` ids are
    /// passed, or other storage errors.
    async fn count_completed(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        video_ids: &[VideoId],
    ) -> Result<u32, StorageError>;

    /// List the user's records, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_recent(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ProgressRecord>, StorageError>;
}

/// Repository contract for the slice of the course catalog used here.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist or replace a video.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the video cannot be stored.
    async fn upsert_video(&self, video: &Video) -> Result<(), StorageError>;

    /// Fetch a video by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_video(&self, id: &VideoId) -> Result<Option<Video>, StorageError>;

    /// List the ids of every video in a course, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_course_videos(&self, course_id: &CourseId) -> Result<Vec<VideoId>, StorageError>;

    /// Atomically add `by` to the video's view counter.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the video does not exist.
    async fn increment_views(&self, id: &VideoId, by: u64) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<(UserId, VideoId), ProgressRecord>>>,
    videos: Arc<Mutex<HashMap<VideoId, Video>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: ToString>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        user_id: &UserId,
        video_id: &VideoId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id.clone(), video_id.clone())).cloned())
    }

    async fn create_progress(&self, record: &ProgressRecord) -> Result<bool, StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let key = (record.user_id().clone(), record.video_id().clone());
        if guard.contains_key(&key) {
            return Ok(false);
        }
        guard.insert(key, record.clone());
        Ok(true)
    }

    async fn merge_progress(
        &self,
        key: &ProgressKey,
        update: &ProgressUpdate,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let record = guard
            .entry((key.user_id.clone(), key.video_id.clone()))
            .or_insert_with(|| {
                ProgressRecord::started(
                    key.user_id.clone(),
                    key.video_id.clone(),
                    key.course_id.clone(),
                    update.updated_at(),
                )
            });
        record.apply(update);
        Ok(())
    }

    async fn count_completed(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        video_ids: &[VideoId],
    ) -> Result<u32, StorageError> {
        check_in_filter(video_ids)?;
        let guard = self.progress.lock().map_err(poisoned)?;
        let count = guard
            .values()
            .filter(|r| {
                r.completed()
                    && r.user_id() == user_id
                    && r.course_id() == course_id
                    && video_ids.contains(r.video_id())
            })
            .count();
        u32::try_from(count).map_err(|_| StorageError::Serialization("count overflow".into()))
    }

    async fn list_recent(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        let mut records: Vec<ProgressRecord> = guard
            .values()
            .filter(|r| r.user_id() == user_id)
            .cloned()
            .collect();
        // Unstamped records sort last, like a missing server timestamp.
        records.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        records.truncate(limit as usize);
        Ok(records)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_video(&self, video: &Video) -> Result<(), StorageError> {
        let mut guard = self.videos.lock().map_err(poisoned)?;
        guard.insert(video.id().clone(), video.clone());
        Ok(())
    }

    async fn get_video(&self, id: &VideoId) -> Result<Option<Video>, StorageError> {
        let guard = self.videos.lock().map_err(poisoned)?;
        Ok(guard.get(id).cloned())
    }

    async fn list_course_videos(&self, course_id: &CourseId) -> Result<Vec<VideoId>, StorageError> {
        let guard = self.videos.lock().map_err(poisoned)?;
        let mut ids: Vec<VideoId> = guard
            .values()
            .filter(|v| v.course_id() == course_id)
            .map(|v| v.id().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn increment_views(&self, id: &VideoId, by: u64) -> Result<(), StorageError> {
        let mut guard = self.videos.lock().map_err(poisoned)?;
        let video = guard.get_mut(id).ok_or(StorageError::NotFound)?;
        video.add_views(by);
        Ok(())
    }
}

/// Aggregates progress and catalog repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo);
        Self { progress, catalog }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::time::fixed_now;

    fn key(video: &str) -> ProgressKey {
        ProgressKey::new(UserId::new("u1"), VideoId::new(video), CourseId::new("c1"))
    }

    fn started(video: &str) -> ProgressRecord {
        let k = key(video);
        ProgressRecord::started(k.user_id, k.video_id, k.course_id, fixed_now())
    }

    #[tokio::test]
    async fn create_only_inserts_once() {
        let repo = InMemoryRepository::new();
        assert!(repo.create_progress(&started("v1")).await.unwrap());
        assert!(!repo.create_progress(&started("v1")).await.unwrap());
    }

    #[tokio::test]
    async fn merge_preserves_identity_and_overwrites_fields() {
        let repo = InMemoryRepository::new();
        repo.create_progress(&started("v1")).await.unwrap();

        let update = ProgressUpdate::compute(0.0, 96.0, 100.0, fixed_now()).unwrap();
        repo.merge_progress(&key("v1"), &update).await.unwrap();

        let rec = repo
            .get_progress(&UserId::new("u1"), &VideoId::new("v1"))
            .await
            .unwrap()
            .unwrap();
        assert!(rec.completed());
        assert_eq!(rec.course_id(), &CourseId::new("c1"));
    }

    #[tokio::test]
    async fn merge_creates_missing_record() {
        let repo = InMemoryRepository::new();
        let update = ProgressUpdate::compute(0.0, 12.0, 100.0, fixed_now()).unwrap();
        repo.merge_progress(&key("v9"), &update).await.unwrap();

        let rec = repo
            .get_progress(&UserId::new("u1"), &VideoId::new("v9"))
            .await
            .unwrap();
        assert!(rec.is_some());
    }

    #[tokio::test]
    async fn count_completed_rejects_oversized_filter() {
        let repo = InMemoryRepository::new();
        let ids: Vec<VideoId> = (0..11).map(|i| VideoId::new(format!("v{i}"))).collect();
        let err = repo
            .count_completed(&UserId::new("u1"), &CourseId::new("c1"), &ids)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::QueryLimit {
                requested: 11,
                limit: 10
            }
        ));
    }

    #[tokio::test]
    async fn list_recent_orders_by_update_time() {
        let repo = InMemoryRepository::new();
        for (i, video) in ["a", "b", "c"].iter().enumerate() {
            let at = fixed_now() + Duration::minutes(i64::try_from(i).unwrap());
            let update = ProgressUpdate::compute(0.0, 10.0, 100.0, at).unwrap();
            repo.merge_progress(&key(video), &update).await.unwrap();
        }

        let recent = repo.list_recent(&UserId::new("u1"), 2).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|r| r.video_id().as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn increment_views_requires_video() {
        let repo = InMemoryRepository::new();
        let err = repo
            .increment_views(&VideoId::new("missing"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }
}
