#![forbid(unsafe_code)]

pub mod aggregator;
pub mod app_services;
pub mod config;
pub mod error;
pub mod history;
pub mod media;
pub mod session;
pub mod tracker;

pub use progress_core::Clock;

pub use aggregator::CourseCompletionAggregator;
pub use app_services::ProgressServices;
pub use config::TrackerConfig;
pub use error::{AggregationError, HistoryError, ProgressServicesError, TrackerError};
pub use history::WatchHistoryService;
pub use media::{MediaElement, MediaEvent, ReportedMedia, SharedMedia};
pub use session::{PlaybackSession, TrackerStatus};
pub use tracker::{
    FlushOutcome, ProgressTracker, SkipReason, TrackerBinding, TrackerContext, TrackerState,
};
