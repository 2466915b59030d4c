//! Per-video progress tracking for one playback session.
//!
//! A `ProgressTracker` binds a media element to the `(user, video)` progress
//! record. It resumes playback from the stored offset and writes forward-only
//! progress back to storage. Scheduling (timer ticks, pause and unload
//! signals) lives in [`crate::session`]; this type only decides *what* to do
//! when asked.
//!
//! The in-memory high-water mark advances only after the store confirms a
//! write, so a failed save is retried with the same offset on the next flush.

use std::sync::Arc;

use progress_core::Clock;
use progress_core::model::{
    CourseId, ProgressRecord, ProgressUpdate, UserId, VideoId, is_usable_duration,
};
use storage::repository::{CatalogRepository, ProgressKey, ProgressRepository, Storage};
use tracing::{debug, error, info, warn};

use crate::error::TrackerError;
use crate::media::{SharedMedia, clamp_seek};

/// Which record a tracker reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerBinding {
    pub user_id: UserId,
    pub video_id: VideoId,
    pub course_id: CourseId,
}

impl TrackerBinding {
    #[must_use]
    pub fn new(user_id: UserId, video_id: VideoId, course_id: CourseId) -> Self {
        Self {
            user_id,
            video_id,
            course_id,
        }
    }

    /// Check that every identifier is present.
    ///
    /// # Errors
    ///
    /// Returns the field-specific `TrackerError` for the first blank id.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.user_id.is_blank() {
            return Err(TrackerError::MissingUserId);
        }
        if self.video_id.is_blank() {
            return Err(TrackerError::MissingVideoId);
        }
        if self.course_id.is_blank() {
            return Err(TrackerError::MissingCourseId);
        }
        Ok(())
    }

    fn key(&self) -> ProgressKey {
        ProgressKey::new(
            self.user_id.clone(),
            self.video_id.clone(),
            self.course_id.clone(),
        )
    }
}

/// Collaborators a tracker needs, passed in explicitly.
#[derive(Clone)]
pub struct TrackerContext {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    catalog: Arc<dyn CatalogRepository>,
}

impl TrackerContext {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        catalog: Arc<dyn CatalogRepository>,
    ) -> Self {
        Self {
            clock,
            progress,
            catalog,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.catalog),
        )
    }
}

/// Lifecycle of a tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerState {
    /// Missing ids or media, or not asked to load yet. No I/O happens here.
    Uninitialized,
    Loading,
    /// Progress is loaded; `high_water` is the largest offset confirmed saved.
    Ready { high_water: f64 },
    /// Loading failed; terminal for this session.
    Errored { reason: String },
}

/// Why a flush did not write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoMedia,
    NotReady,
    /// Duration is zero, unknown or infinite.
    UnknownDuration,
    /// Position has not moved past the high-water mark.
    NoAdvance,
    /// The owning session has already shut down.
    Closed,
}

/// Result of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlushOutcome {
    Saved { position: f64, completed: bool },
    Skipped(SkipReason),
    /// The store rejected the write; the high-water mark is unchanged.
    Failed,
}

impl FlushOutcome {
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Binds one media element to its persisted progress record.
pub struct ProgressTracker {
    ctx: TrackerContext,
    binding: TrackerBinding,
    media: Option<SharedMedia>,
    state: TrackerState,
    last_error: Option<String>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(ctx: TrackerContext, binding: TrackerBinding, media: Option<SharedMedia>) -> Self {
        Self {
            ctx,
            binding,
            media,
            state: TrackerState::Uninitialized,
            last_error: None,
        }
    }

    /// Attach a media element that mounted after the tracker was created.
    pub fn mount(&mut self, media: SharedMedia) {
        self.media = Some(media);
    }

    #[must_use]
    pub fn binding(&self) -> &TrackerBinding {
        &self.binding
    }

    #[must_use]
    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, TrackerState::Ready { .. })
    }

    #[must_use]
    pub fn is_errored(&self) -> bool {
        matches!(self.state, TrackerState::Errored { .. })
    }

    /// True once loading has finished, successfully or not.
    #[must_use]
    pub fn progress_loaded(&self) -> bool {
        self.is_ready() || self.is_errored()
    }

    /// Human-readable error for the view, if any.
    #[must_use]
    pub fn progress_error(&self) -> Option<&str> {
        match &self.state {
            TrackerState::Errored { reason } => Some(reason.as_str()),
            _ => self.last_error.as_deref(),
        }
    }

    #[must_use]
    pub fn high_water_mark(&self) -> Option<f64> {
        match self.state {
            TrackerState::Ready { high_water } => Some(high_water),
            _ => None,
        }
    }

    fn preconditions(&self) -> Result<SharedMedia, TrackerError> {
        self.binding.validate()?;
        self.media.clone().ok_or(TrackerError::MissingMedia)
    }

    /// Fetch or create the progress record and resume playback from it.
    ///
    /// On first open this creates a zero-progress record and bumps the video's
    /// view counter; later opens only read. A ready tracker flushes before
    /// reloading; if that write fails the reload is skipped and the tracker
    /// stays ready with the save error, so unsaved progress is not lost.
    ///
    /// # Errors
    ///
    /// Returns a precondition `TrackerError` (state stays `Uninitialized`, no
    /// I/O) or `TrackerError::Load` (state becomes `Errored`).
    pub async fn load(&mut self) -> Result<(), TrackerError> {
        let media = match self.preconditions() {
            Ok(media) => media,
            Err(err) => {
                debug!(error = %err, "progress load skipped");
                self.last_error = Some(err.to_string());
                self.state = TrackerState::Uninitialized;
                return Err(err);
            }
        };

        let reloading = self.is_ready();
        if reloading && self.flush().await == FlushOutcome::Failed {
            // Keep the unconfirmed position and its error; the next flush retries it.
            warn!(
                video_id = %self.binding.video_id,
                "reload skipped: unsaved progress could not be written"
            );
            return Ok(());
        }

        self.state = TrackerState::Loading;
        match self.fetch_or_create().await {
            Ok(offset) => {
                // A reload never moves the playhead backwards.
                let rewinds = reloading && offset < media.current_time();
                if offset > 0.0 && !rewinds {
                    media.seek(clamp_seek(offset, media.duration()));
                }
                debug!(
                    user_id = %self.binding.user_id,
                    video_id = %self.binding.video_id,
                    offset,
                    "progress loaded"
                );
                self.last_error = None;
                self.state = TrackerState::Ready { high_water: offset };
                Ok(())
            }
            Err(err) => {
                error!(
                    user_id = %self.binding.user_id,
                    video_id = %self.binding.video_id,
                    error = ?err,
                    "failed to load progress"
                );
                self.state = TrackerState::Errored {
                    reason: err.to_string(),
                };
                Err(err)
            }
        }
    }

    async fn fetch_or_create(&self) -> Result<f64, TrackerError> {
        let user_id = &self.binding.user_id;
        let video_id = &self.binding.video_id;

        if let Some(record) = self
            .ctx
            .progress
            .get_progress(user_id, video_id)
            .await
            .map_err(TrackerError::Load)?
        {
            return Ok(record.last_watched_at());
        }

        let record = ProgressRecord::started(
            user_id.clone(),
            video_id.clone(),
            self.binding.course_id.clone(),
            self.ctx.clock.now(),
        );
        let created = self
            .ctx
            .progress
            .create_progress(&record)
            .await
            .map_err(TrackerError::Load)?;

        if !created {
            // Another writer created it between our read and insert.
            let existing = self
                .ctx
                .progress
                .get_progress(user_id, video_id)
                .await
                .map_err(TrackerError::Load)?;
            return Ok(existing.map_or(0.0, |r| r.last_watched_at()));
        }

        info!(user_id = %user_id, video_id = %video_id, "started progress record");
        if let Err(err) = self.ctx.catalog.increment_views(video_id, 1).await {
            // The record exists now, so a retry would never count this view.
            warn!(video_id = %video_id, error = %err, "failed to count video view");
        }
        Ok(0.0)
    }

    /// Persist the current position if it moved past the high-water mark.
    ///
    /// Never returns an error: a failed write is logged, surfaced through
    /// [`Self::progress_error`] and retried by the next flush.
    pub async fn flush(&mut self) -> FlushOutcome {
        let Some(media) = self.media.clone() else {
            return FlushOutcome::Skipped(SkipReason::NoMedia);
        };
        let TrackerState::Ready { high_water } = self.state else {
            return FlushOutcome::Skipped(SkipReason::NotReady);
        };

        let duration = media.duration();
        if !is_usable_duration(duration) {
            debug!(video_id = %self.binding.video_id, duration, "skipping save: unusable duration");
            return FlushOutcome::Skipped(SkipReason::UnknownDuration);
        }

        let Some(update) = ProgressUpdate::compute(
            high_water,
            media.current_time(),
            duration,
            self.ctx.clock.now(),
        ) else {
            return FlushOutcome::Skipped(SkipReason::NoAdvance);
        };

        match self
            .ctx
            .progress
            .merge_progress(&self.binding.key(), &update)
            .await
        {
            Ok(()) => {
                let position = update.last_watched_at();
                self.state = TrackerState::Ready {
                    high_water: position,
                };
                self.last_error = None;
                if update.completed() {
                    info!(
                        user_id = %self.binding.user_id,
                        video_id = %self.binding.video_id,
                        position,
                        duration,
                        "video completed"
                    );
                } else {
                    debug!(video_id = %self.binding.video_id, position, duration, "progress saved");
                }
                FlushOutcome::Saved {
                    position,
                    completed: update.completed(),
                }
            }
            Err(source) => {
                let err = TrackerError::Save(source);
                error!(
                    user_id = %self.binding.user_id,
                    video_id = %self.binding.video_id,
                    error = ?err,
                    "failed to save progress"
                );
                self.last_error = Some(err.to_string());
                FlushOutcome::Failed
            }
        }
    }

    /// Move to another video in the same course without a new tracker.
    ///
    /// The outgoing video is flushed first. The media position is reset so
    /// the old offset cannot be written against the new video. A tracker that
    /// has not loaded yet is only rebound; it loads on the next `load`.
    ///
    /// # Errors
    ///
    /// Returns the `TrackerError` from loading the new target.
    pub async fn switch_target(&mut self, video_id: VideoId) -> Result<(), TrackerError> {
        let loaded = self.progress_loaded();
        let outgoing = self.flush().await;
        debug!(
            from = %self.binding.video_id,
            to = %video_id,
            outgoing = ?outgoing,
            "switching progress target"
        );

        self.binding.video_id = video_id;
        self.state = TrackerState::Uninitialized;
        self.last_error = None;
        if let Some(media) = &self.media {
            media.seek(0.0);
        }
        if !loaded {
            return Ok(());
        }
        self.load().await
    }

    /// Final best-effort flush, then detach from the media element.
    pub async fn teardown(&mut self) -> FlushOutcome {
        let outcome = self.flush().await;
        self.media = None;
        if !self.is_errored() {
            self.state = TrackerState::Uninitialized;
        }
        outcome
    }
}
