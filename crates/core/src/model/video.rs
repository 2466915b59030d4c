use serde::Serialize;
use thiserror::Error;

use crate::model::{CourseId, VideoId};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum VideoError {
    #[error("video title cannot be empty")]
    EmptyTitle,

    #[error("video duration must be finite and positive, got {0}")]
    InvalidDuration(f64),
}

/// The slice of a catalog video this crate cares about.
///
/// The catalog owns the full entity; progress tracking only needs the
/// course it belongs to, an optional known duration and the view counter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    id: VideoId,
    course_id: CourseId,
    title: String,
    duration: Option<f64>,
    views: u64,
}

impl Video {
    /// Creates a video with zero views.
    ///
    /// # Errors
    ///
    /// Returns `VideoError::EmptyTitle` if the trimmed title is empty.
    pub fn new(
        id: VideoId,
        course_id: CourseId,
        title: impl Into<String>,
    ) -> Result<Self, VideoError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(VideoError::EmptyTitle);
        }
        Ok(Self {
            id,
            course_id,
            title,
            duration: None,
            views: 0,
        })
    }

    /// Attach the duration derived by the upload service.
    ///
    /// # Errors
    ///
    /// Returns `VideoError::InvalidDuration` for zero, negative or non-finite values.
    pub fn with_duration(mut self, seconds: f64) -> Result<Self, VideoError> {
        if !(seconds.is_finite() && seconds > 0.0) {
            return Err(VideoError::InvalidDuration(seconds));
        }
        self.duration = Some(seconds);
        Ok(self)
    }

    /// Rehydrate a video from storage.
    ///
    /// # Errors
    ///
    /// Returns `VideoError` if the title or duration fail validation.
    pub fn from_persisted(
        id: VideoId,
        course_id: CourseId,
        title: String,
        duration: Option<f64>,
        views: u64,
    ) -> Result<Self, VideoError> {
        let mut video = Self::new(id, course_id, title)?;
        if let Some(seconds) = duration {
            video = video.with_duration(seconds)?;
        }
        video.views = views;
        Ok(video)
    }

    /// Add to the view counter, saturating at `u64::MAX`.
    pub fn add_views(&mut self, by: u64) {
        self.views = self.views.saturating_add(by);
    }

    #[must_use]
    pub fn id(&self) -> &VideoId {
        &self.id
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    #[must_use]
    pub fn views(&self) -> u64 {
        self.views
    }
}
