//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::model::CourseId;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressTracker`.
///
/// The display strings are what views render as `progressError`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    #[error("User ID is missing")]
    MissingUserId,
    #[error("Video ID is missing")]
    MissingVideoId,
    #[error("Course ID is missing")]
    MissingCourseId,
    #[error("Media element is missing")]
    MissingMedia,
    #[error("Failed to load video progress")]
    Load(#[source] StorageError),
    #[error("Failed to save video progress")]
    Save(#[source] StorageError),
    #[error("playback session has ended")]
    SessionClosed,
}

impl TrackerError {
    /// True for errors raised before any I/O was attempted.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingUserId | Self::MissingVideoId | Self::MissingCourseId | Self::MissingMedia
        )
    }
}

/// Errors emitted by `CourseCompletionAggregator`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AggregationError {
    #[error("failed to list videos for course {course_id}")]
    Roster {
        course_id: CourseId,
        #[source]
        source: StorageError,
    },
    #[error("failed to count completed videos for course {course_id}")]
    Completed {
        course_id: CourseId,
        #[source]
        source: StorageError,
    },
}

/// Errors emitted by `WatchHistoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping progress services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
