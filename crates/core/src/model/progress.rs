use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{CourseId, UserId, VideoId};

/// Fraction of the duration at which a video counts as completed (inclusive).
pub const COMPLETION_THRESHOLD: f64 = 0.95;

/// Returns true if `duration` can anchor a progress write.
///
/// Zero, negative, `NaN` and infinite durations (live streams, unloaded
/// metadata) cannot.
#[must_use]
pub fn is_usable_duration(duration: f64) -> bool {
    duration.is_finite() && duration > 0.0
}

/// Returns true if `position` reaches the completion threshold of `duration`.
#[must_use]
pub fn is_completed(position: f64, duration: f64) -> bool {
    is_usable_duration(duration) && position >= duration * COMPLETION_THRESHOLD
}

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("last watched offset must be finite and non-negative, got {0}")]
    InvalidOffset(f64),

    #[error("duration must be finite and non-negative, got {0}")]
    InvalidDuration(f64),
}

/// Persisted progress for one (user, video) pair.
///
/// `completed` is a snapshot taken at write time and is never recomputed from
/// the other fields. `updated_at` is `None` until the store has stamped a write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    user_id: UserId,
    video_id: VideoId,
    course_id: CourseId,
    last_watched_at: f64,
    duration: f64,
    completed: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// Zero-progress record written the first time a video is opened.
    #[must_use]
    pub fn started(
        user_id: UserId,
        video_id: VideoId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            video_id,
            course_id,
            last_watched_at: 0.0,
            duration: 0.0,
            completed: false,
            updated_at: Some(now),
        }
    }

    /// Rehydrate a record from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the offset or duration is negative or not finite.
    pub fn from_persisted(
        user_id: UserId,
        video_id: VideoId,
        course_id: CourseId,
        last_watched_at: f64,
        duration: f64,
        completed: bool,
        updated_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        if !last_watched_at.is_finite() || last_watched_at < 0.0 {
            return Err(ProgressError::InvalidOffset(last_watched_at));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(ProgressError::InvalidDuration(duration));
        }
        Ok(Self {
            user_id,
            video_id,
            course_id,
            last_watched_at,
            duration,
            completed,
            updated_at,
        })
    }

    /// Merge a partial update into this record.
    ///
    /// Only the fields carried by the update change; identity is preserved.
    /// Last write wins, the store does not enforce monotonic offsets.
    pub fn apply(&mut self, update: &ProgressUpdate) {
        self.last_watched_at = update.last_watched_at;
        self.duration = update.duration;
        self.completed = update.completed;
        self.updated_at = Some(update.updated_at);
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn last_watched_at(&self) -> f64 {
        self.last_watched_at
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

/// Partial update merged into an existing progress record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    last_watched_at: f64,
    duration: f64,
    completed: bool,
    updated_at: DateTime<Utc>,
}

impl ProgressUpdate {
    /// Decide whether the current playback position warrants a write.
    ///
    /// The candidate offset is `max(current_time, high_water)`. Returns `None`
    /// when `duration` is unusable or the candidate does not strictly exceed
    /// `high_water`, so repeated ticks at an unchanged position never write.
    #[must_use]
    pub fn compute(
        high_water: f64,
        current_time: f64,
        duration: f64,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if !is_usable_duration(duration) {
            return None;
        }
        let candidate = current_time.max(high_water);
        if !candidate.is_finite() || candidate <= high_water {
            return None;
        }
        Some(Self {
            last_watched_at: candidate,
            duration,
            completed: is_completed(candidate, duration),
            updated_at: now,
        })
    }

    #[must_use]
    pub fn last_watched_at(&self) -> f64 {
        self.last_watched_at
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn record() -> ProgressRecord {
        ProgressRecord::started(
            UserId::new("u1"),
            VideoId::new("v1"),
            CourseId::new("c1"),
            fixed_now(),
        )
    }

    #[test]
    fn completion_boundary_is_inclusive() {
        assert!(is_completed(95.0, 100.0));
        assert!(!is_completed(94.99, 100.0));
        assert!(!is_completed(10.0, 0.0));
        assert!(!is_completed(10.0, f64::INFINITY));
        assert!(!is_completed(10.0, f64::NAN));
    }

    #[test]
    fn compute_skips_unusable_duration() {
        assert_eq!(ProgressUpdate::compute(0.0, 50.0, 0.0, fixed_now()), None);
        assert_eq!(
            ProgressUpdate::compute(0.0, 50.0, f64::INFINITY, fixed_now()),
            None
        );
    }

    #[test]
    fn compute_requires_strict_advance() {
        assert_eq!(ProgressUpdate::compute(40.0, 40.0, 100.0, fixed_now()), None);
        assert_eq!(ProgressUpdate::compute(40.0, 10.0, 100.0, fixed_now()), None);
        assert_eq!(ProgressUpdate::compute(0.0, 0.0, 100.0, fixed_now()), None);
        assert_eq!(ProgressUpdate::compute(5.0, f64::NAN, 100.0, fixed_now()), None);
    }

    #[test]
    fn compute_marks_completion_at_threshold() {
        let update = ProgressUpdate::compute(40.0, 95.0, 100.0, fixed_now()).unwrap();
        assert!((update.last_watched_at() - 95.0).abs() < f64::EPSILON);
        assert!(update.completed());

        let partial = ProgressUpdate::compute(0.0, 60.0, 100.0, fixed_now()).unwrap();
        assert!(!partial.completed());
    }

    #[test]
    fn apply_merges_fields_and_keeps_identity() {
        let mut rec = record();
        let later = fixed_now() + chrono::Duration::seconds(15);
        let update = ProgressUpdate::compute(0.0, 30.0, 120.0, later).unwrap();
        rec.apply(&update);

        assert_eq!(rec.video_id(), &VideoId::new("v1"));
        assert!((rec.last_watched_at() - 30.0).abs() < f64::EPSILON);
        assert!((rec.duration() - 120.0).abs() < f64::EPSILON);
        assert!(!rec.completed());
        assert_eq!(rec.updated_at(), Some(later));
    }

    #[test]
    fn from_persisted_rejects_negative_offset() {
        let err = ProgressRecord::from_persisted(
            UserId::new("u1"),
            VideoId::new("v1"),
            CourseId::new("c1"),
            -1.0,
            10.0,
            false,
            None,
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::InvalidOffset(-1.0));
    }

    #[test]
    fn serializes_with_document_field_names() {
        let value = serde_json::to_value(record()).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["videoId"], "v1");
        assert_eq!(value["courseId"], "c1");
        assert_eq!(value["lastWatchedAt"], 0.0);
        assert_eq!(value["completed"], false);
        assert!(value.get("updatedAt").is_some());
    }
}
