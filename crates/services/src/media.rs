use std::sync::{Arc, Mutex};

use progress_core::model::is_usable_duration;

/// A playable media element as seen by the tracker.
///
/// Mirrors the handful of properties a browser `<video>` exposes. `duration`
/// reports `NaN` before metadata is available and `INFINITY` for live sources.
pub trait MediaElement: Send + Sync {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// Total duration in seconds.
    fn duration(&self) -> f64;

    /// Move the playback position.
    fn seek(&self, position: f64);
}

pub type SharedMedia = Arc<dyn MediaElement>;

/// Signals from the media element and its host window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    /// Duration and dimensions are known; progress can be loaded.
    MetadataLoaded,
    Pause,
    /// The host is about to unload the page or view.
    BeforeUnload,
}

/// Clamp a resume offset into the seekable range of the element.
#[must_use]
pub fn clamp_seek(position: f64, duration: f64) -> f64 {
    let position = if position.is_finite() { position.max(0.0) } else { 0.0 };
    if is_usable_duration(duration) {
        position.min(duration)
    } else {
        position
    }
}

#[derive(Debug)]
struct Playhead {
    position: f64,
    duration: f64,
}

/// Media handle for hosts that report positions instead of exposing an element.
///
/// Native players and tests push the current position and duration in;
/// seeks requested by the tracker are applied to the stored position.
#[derive(Debug)]
pub struct ReportedMedia {
    playhead: Mutex<Playhead>,
}

impl Default for ReportedMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportedMedia {
    /// Position 0 and unknown (`NaN`) duration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            playhead: Mutex::new(Playhead {
                position: 0.0,
                duration: f64::NAN,
            }),
        }
    }

    #[must_use]
    pub fn with_duration(duration: f64) -> Self {
        let media = Self::new();
        media.set_duration(duration);
        media
    }

    pub fn set_position(&self, position: f64) {
        if let Ok(mut playhead) = self.playhead.lock() {
            playhead.position = position;
        }
    }

    pub fn set_duration(&self, duration: f64) {
        if let Ok(mut playhead) = self.playhead.lock() {
            playhead.duration = duration;
        }
    }
}

impl MediaElement for ReportedMedia {
    fn current_time(&self) -> f64 {
        self.playhead.lock().map_or(0.0, |p| p.position)
    }

    fn duration(&self) -> f64 {
        self.playhead.lock().map_or(f64::NAN, |p| p.duration)
    }

    fn seek(&self, position: f64) {
        self.set_position(position);
    }
}
