use progress_core::model::{CourseId, ProgressRecord, UserId, Video, VideoId};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn map_progress_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProgressRecord, StorageError> {
    ProgressRecord::from_persisted(
        UserId::new(row.try_get::<String, _>("user_id").map_err(ser)?),
        VideoId::new(row.try_get::<String, _>("video_id").map_err(ser)?),
        CourseId::new(row.try_get::<String, _>("course_id").map_err(ser)?),
        row.try_get("last_watched_at").map_err(ser)?,
        row.try_get("duration").map_err(ser)?,
        row.try_get("completed").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_video_row(row: &sqlx::sqlite::SqliteRow) -> Result<Video, StorageError> {
    let views = i64_to_u64("views", row.try_get::<i64, _>("views").map_err(ser)?)?;
    Video::from_persisted(
        VideoId::new(row.try_get::<String, _>("id").map_err(ser)?),
        CourseId::new(row.try_get::<String, _>("course_id").map_err(ser)?),
        row.try_get("title").map_err(ser)?,
        row.try_get("duration").map_err(ser)?,
        views,
    )
    .map_err(ser)
}
