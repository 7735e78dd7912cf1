use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spm_common::db::CourseStudent;
use spm_common::Result;
use sqlx::SqliteConnection;

/// Course enrollments
#[async_trait]
pub trait CourseStudentReader: Send + Sync {
    /// Live enrollments whose `updated_at` lies in `[from, to]`
    async fn retrieve_by_interval_time(
        &self,
        conn: &mut SqliteConnection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CourseStudent>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCourseStudentRepo;

#[async_trait]
impl CourseStudentReader for SqliteCourseStudentRepo {
    async fn retrieve_by_interval_time(
        &self,
        conn: &mut SqliteConnection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CourseStudent>> {
        let rows = sqlx::query_as::<_, CourseStudent>(
            r#"
            SELECT course_id, student_id, created_at, updated_at
            FROM course_students
            WHERE updated_at BETWEEN ? AND ?
              AND deleted_at IS NULL
            ORDER BY course_id, student_id
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}
