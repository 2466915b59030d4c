use std::collections::BTreeMap;
use std::sync::Arc;

use progress_core::model::{CourseId, CourseProgress, ProgressReport, UserId, VideoId};
use storage::repository::{CatalogRepository, MAX_IN_FILTER, ProgressRepository};
use tracing::{debug, error};

use crate::error::AggregationError;

/// Computes completion percentages from stored progress records.
///
/// Read-only: it shares nothing with running trackers except the store, so it
/// can be called repeatedly and from several tasks at once.
#[derive(Clone)]
pub struct CourseCompletionAggregator {
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressRepository>,
    chunk_size: usize,
}

impl CourseCompletionAggregator {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>, progress: Arc<dyn ProgressRepository>) -> Self {
        Self {
            catalog,
            progress,
            chunk_size: MAX_IN_FILTER,
        }
    }

    /// Override the number of ids per `in` query, clamped to `1..=MAX_IN_FILTER`.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_IN_FILTER);
        self
    }

    /// Per-course and overall completion for `user_id` across `course_ids`.
    ///
    /// Courses without videos are left out of the map and the overall
    /// denominator but still count toward `total_courses`.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError` if any catalog or progress query fails; no
    /// partial report is produced.
    pub async fn compute_progress(
        &self,
        user_id: &UserId,
        course_ids: &[CourseId],
    ) -> Result<ProgressReport, AggregationError> {
        let mut courses = BTreeMap::new();

        for course_id in course_ids {
            if courses.contains_key(course_id) {
                continue;
            }

            let roster = self
                .catalog
                .list_course_videos(course_id)
                .await
                .map_err(|source| {
                    error!(course_id = %course_id, error = %source, "failed to list course videos");
                    AggregationError::Roster {
                        course_id: course_id.clone(),
                        source,
                    }
                })?;
            if roster.is_empty() {
                debug!(course_id = %course_id, "course has no videos, skipping");
                continue;
            }

            let completed = self.completed_count(user_id, course_id, &roster).await?;
            let total = u32::try_from(roster.len()).unwrap_or(u32::MAX);
            courses.insert(course_id.clone(), CourseProgress::new(total, completed.min(total)));
        }

        let report = ProgressReport::from_courses(course_ids.len(), courses);
        debug!(
            user_id = %user_id,
            courses = report.courses().len(),
            overall = report.overall_progress(),
            "computed course progress"
        );
        Ok(report)
    }

    /// Number of completed videos among `video_ids` in one course.
    ///
    /// The ids are queried in chunks no larger than the store's `in` limit.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::Completed` if any chunk query fails.
    pub async fn completed_count(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        video_ids: &[VideoId],
    ) -> Result<u32, AggregationError> {
        let mut total = 0_u32;
        for chunk in video_ids.chunks(self.chunk_size) {
            let count = self
                .progress
                .count_completed(user_id, course_id, chunk)
                .await
                .map_err(|source| {
                    error!(course_id = %course_id, error = %source, "failed to count completed videos");
                    AggregationError::Completed {
                        course_id: course_id.clone(),
                        source,
                    }
                })?;
            total = total.saturating_add(count);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use progress_core::model::{ProgressRecord, ProgressUpdate, Video};
    use progress_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, ProgressKey, StorageError};

    async fn seed_course(repo: &InMemoryRepository, course: &str, videos: usize, completed: usize) {
        for i in 0..videos {
            let video_id = VideoId::new(format!("{course}-{i:02}"));
            let video = Video::new(video_id.clone(), CourseId::new(course), format!("V{i}")).unwrap();
            repo.upsert_video(&video).await.unwrap();
            if i < completed {
                let update = ProgressUpdate::compute(0.0, 100.0, 100.0, fixed_now()).unwrap();
                let key = ProgressKey::new(UserId::new("u1"), video_id, CourseId::new(course));
                repo.merge_progress(&key, &update).await.unwrap();
            }
        }
    }

    fn aggregator(repo: &InMemoryRepository) -> CourseCompletionAggregator {
        CourseCompletionAggregator::new(Arc::new(repo.clone()), Arc::new(repo.clone()))
    }

    #[tokio::test]
    async fn empty_course_list_yields_zero_report() {
        let repo = InMemoryRepository::new();
        let report = aggregator(&repo)
            .compute_progress(&UserId::new("u1"), &[])
            .await
            .unwrap();
        assert_eq!(report, ProgressReport::empty());
    }

    #[tokio::test]
    async fn half_completed_course_reports_fifty_percent() {
        let repo = InMemoryRepository::new();
        seed_course(&repo, "c", 4, 2).await;

        let report = aggregator(&repo)
            .compute_progress(&UserId::new("u1"), &[CourseId::new("c")])
            .await
            .unwrap();

        assert_eq!(
            report.course(&CourseId::new("c")),
            Some(&CourseProgress {
                total: 4,
                completed: 2,
                progress: 50
            })
        );
        assert_eq!(report.overall_progress(), 50);
        assert_eq!(report.total_courses(), 1);
    }

    #[tokio::test]
    async fn empty_courses_are_excluded_from_denominator() {
        let repo = InMemoryRepository::new();
        seed_course(&repo, "full", 2, 2).await;

        let report = aggregator(&repo)
            .compute_progress(
                &UserId::new("u1"),
                &[CourseId::new("full"), CourseId::new("empty")],
            )
            .await
            .unwrap();

        assert_eq!(report.total_courses(), 2);
        assert_eq!(report.courses().len(), 1);
        assert_eq!(report.overall_progress(), 100);
        assert_eq!(report.completed_courses(), 1);
    }

    #[tokio::test]
    async fn incomplete_records_are_not_counted() {
        let repo = InMemoryRepository::new();
        seed_course(&repo, "c", 3, 0).await;
        let record = ProgressRecord::started(
            UserId::new("u1"),
            VideoId::new("c-00"),
            CourseId::new("c"),
            fixed_now(),
        );
        repo.create_progress(&record).await.unwrap();

        let report = aggregator(&repo)
            .compute_progress(&UserId::new("u1"), &[CourseId::new("c")])
            .await
            .unwrap();
        assert_eq!(report.course(&CourseId::new("c")).unwrap().completed, 0);
    }

    /// Counts `count_completed` queries and can simulate an outage.
    struct CountingProgress {
        inner: InMemoryRepository,
        queries: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ProgressRepository for CountingProgress {
        async fn get_progress(
            &self,
            user_id: &UserId,
            video_id: &VideoId,
        ) -> Result<Option<ProgressRecord>, StorageError> {
            self.inner.get_progress(user_id, video_id).await
        }

        async fn create_progress(&self, record: &ProgressRecord) -> Result<bool, StorageError> {
            self.inner.create_progress(record).await
        }

        async fn merge_progress(
            &self,
            key: &ProgressKey,
            update: &ProgressUpdate,
        ) -> Result<(), StorageError> {
            self.inner.merge_progress(key, update).await
        }

        async fn count_completed(
            &self,
            user_id: &UserId,
            course_id: &CourseId,
            video_ids: &[VideoId],
        ) -> Result<u32, StorageError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StorageError::Connection("offline".into()));
            }
            self.inner.count_completed(user_id, course_id, video_ids).await
        }

        async fn list_recent(
            &self,
            user_id: &UserId,
            limit: u32,
        ) -> Result<Vec<ProgressRecord>, StorageError> {
            self.inner.list_recent(user_id, limit).await
        }
    }

    #[tokio::test]
    async fn large_rosters_are_chunked() {
        let repo = InMemoryRepository::new();
        seed_course(&repo, "big", 23, 21).await;
        let progress = Arc::new(CountingProgress {
            inner: repo.clone(),
            queries: AtomicUsize::new(0),
            fail: false,
        });
        let agg = CourseCompletionAggregator::new(Arc::new(repo), progress.clone());

        let report = agg
            .compute_progress(&UserId::new("u1"), &[CourseId::new("big")])
            .await
            .unwrap();

        assert_eq!(progress.queries.load(Ordering::SeqCst), 3);
        let course = report.course(&CourseId::new("big")).unwrap();
        assert_eq!(course.completed, 21);
        assert_eq!(course.progress, 91);
    }

    #[tokio::test]
    async fn query_failure_aborts_whole_computation() {
        let repo = InMemoryRepository::new();
        seed_course(&repo, "a", 2, 1).await;
        seed_course(&repo, "b", 2, 1).await;
        let progress = Arc::new(CountingProgress {
            inner: repo.clone(),
            queries: AtomicUsize::new(0),
            fail: true,
        });
        let agg = CourseCompletionAggregator::new(Arc::new(repo), progress);

        let err = agg
            .compute_progress(&UserId::new("u1"), &[CourseId::new("a"), CourseId::new("b")])
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::Completed { ref course_id, .. } if course_id == &CourseId::new("a")));
    }
}
