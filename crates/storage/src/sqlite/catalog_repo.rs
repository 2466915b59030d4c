use progress_core::model::{CourseId, Video, VideoId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, map_video_row, ser, u64_to_i64};
use crate::repository::{CatalogRepository, StorageError};

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_video(&self, video: &Video) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO videos (id, course_id, title, duration, views)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title,
                duration = excluded.duration,
                views = excluded.views
            ",
        )
        .bind(video.id().as_str())
        .bind(video.course_id().as_str())
        .bind(video.title())
        .bind(video.duration())
        .bind(u64_to_i64("views", video.views())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_video(&self, id: &VideoId) -> Result<Option<Video>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, course_id, title, duration, views
            FROM videos
            WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_video_row).transpose()
    }

    async fn list_course_videos(&self, course_id: &CourseId) -> Result<Vec<VideoId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id
            FROM videos
            WHERE course_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(VideoId::new(row.try_get::<String, _>("id").map_err(ser)?));
        }
        Ok(out)
    }

    async fn increment_views(&self, id: &VideoId, by: u64) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE videos SET views = views + ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(u64_to_i64("views increment", by)?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
