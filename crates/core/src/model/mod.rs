mod ids;
mod progress;
mod report;
mod video;

pub use ids::{CourseId, IdError, UserId, VideoId};

pub use progress::{
    COMPLETION_THRESHOLD, ProgressError, ProgressRecord, ProgressUpdate, is_completed,
    is_usable_duration,
};
pub use report::{CourseProgress, ProgressReport, percent};
pub use video::{Video, VideoError};
