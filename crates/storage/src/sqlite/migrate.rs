use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Applies pending schema versions in order.
///
/// Version 1 creates the catalog `videos` table and the `progress` table keyed
/// by `(user_id, video_id)`, plus the indexes backing course-scoped completion
/// counts and recently-watched lists.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS videos (
                    id TEXT PRIMARY KEY,
                    course_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    duration REAL CHECK (duration IS NULL OR duration > 0),
                    views INTEGER NOT NULL DEFAULT 0 CHECK (views >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // No foreign key to videos: the catalog is owned elsewhere and progress
        // rows must survive catalog churn.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress (
                    user_id TEXT NOT NULL,
                    video_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    last_watched_at REAL NOT NULL CHECK (last_watched_at >= 0),
                    duration REAL NOT NULL CHECK (duration >= 0),
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    updated_at TEXT,
                    PRIMARY KEY (user_id, video_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_videos_course
                    ON videos (course_id, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_user_course_completed
                    ON progress (user_id, course_id, completed);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_user_updated
                    ON progress (user_id, updated_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
