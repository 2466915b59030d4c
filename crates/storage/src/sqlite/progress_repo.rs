use progress_core::model::{CourseId, ProgressRecord, ProgressUpdate, UserId, VideoId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, map_progress_row, ser};
use crate::repository::{ProgressKey, ProgressRepository, StorageError, check_in_filter};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        user_id: &UserId,
        video_id: &VideoId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT user_id, video_id, course_id, last_watched_at, duration, completed, updated_at
                FROM progress
                WHERE user_id = ?1 AND video_id = ?2
            ",
        )
        .bind(user_id.as_str())
        .bind(video_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn create_progress(&self, record: &ProgressRecord) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO progress (
                    user_id, video_id, course_id, last_watched_at, duration, completed, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(user_id, video_id) DO NOTHING
            ",
        )
        .bind(record.user_id().as_str())
        .bind(record.video_id().as_str())
        .bind(record.course_id().as_str())
        .bind(record.last_watched_at())
        .bind(record.duration())
        .bind(record.completed())
        .bind(record.updated_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.rows_affected() == 1)
    }

    async fn merge_progress(
        &self,
        key: &ProgressKey,
        update: &ProgressUpdate,
    ) -> Result<(), StorageError> {
        // Identity columns are only written on insert; course_id stays as first recorded.
        sqlx::query(
            r"
                INSERT INTO progress (
                    user_id, video_id, course_id, last_watched_at, duration, completed, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(user_id, video_id) DO UPDATE SET
                    last_watched_at = excluded.last_watched_at,
                    duration = excluded.duration,
                    completed = excluded.completed,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(key.user_id.as_str())
        .bind(key.video_id.as_str())
        .bind(key.course_id.as_str())
        .bind(update.last_watched_at())
        .bind(update.duration())
        .bind(update.completed())
        .bind(update.updated_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn count_completed(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        video_ids: &[VideoId],
    ) -> Result<u32, StorageError> {
        check_in_filter(video_ids)?;
        if video_ids.is_empty() {
            return Ok(0);
        }

        let mut sql = String::from(
            r"
                SELECT COUNT(*) AS completed_count
                FROM progress
                WHERE user_id = ?1 AND course_id = ?2 AND completed = 1
                  AND video_id IN (
            ",
        );
        for i in 0..video_ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 3).to_string());
        }
        sql.push(')');

        let mut query = sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(course_id.as_str());
        for video_id in video_ids {
            query = query.bind(video_id.as_str());
        }

        let row = query.fetch_one(&self.pool).await.map_err(conn)?;
        let count: i64 = row.try_get("completed_count").map_err(ser)?;
        u32::try_from(count).map_err(|_| StorageError::Serialization(format!("invalid count: {count}")))
    }

    async fn list_recent(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT user_id, video_id, course_id, last_watched_at, duration, completed, updated_at
                FROM progress
                WHERE user_id = ?1
                ORDER BY updated_at IS NULL, updated_at DESC, video_id ASC
                LIMIT ?2
            ",
        )
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }
}
