//! Course content catalog: learning objectives and assignments, each resolved
//! to its place in a book (book → chapter → topic).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spm_common::db::{BookAssignment, BookLearningObjective};
use spm_common::Result;
use sqlx::SqliteConnection;

#[async_trait]
pub trait LearningObjectiveReader: Send + Sync {
    /// Learning objectives changed in `[from, to]`, with their book position
    async fn retrieve_book_lo_by_interval_time(
        &self,
        conn: &mut SqliteConnection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookLearningObjective>>;
}

#[async_trait]
pub trait AssignmentReader: Send + Sync {
    /// Assignments changed in `[from, to]`, with their book position
    async fn retrieve_book_assignment_by_interval_time(
        &self,
        conn: &mut SqliteConnection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookAssignment>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteLearningObjectiveRepo;

#[async_trait]
impl LearningObjectiveReader for SqliteLearningObjectiveRepo {
    async fn retrieve_book_lo_by_interval_time(
        &self,
        conn: &mut SqliteConnection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookLearningObjective>> {
        let rows = sqlx::query_as::<_, BookLearningObjective>(
            r#"
            SELECT bc.book_id, t.chapter_id, lo.topic_id, lo.lo_id, lo.display_order
            FROM learning_objectives lo
            JOIN topics t ON t.topic_id = lo.topic_id AND t.deleted_at IS NULL
            JOIN books_chapters bc ON bc.chapter_id = t.chapter_id AND bc.deleted_at IS NULL
            WHERE lo.updated_at BETWEEN ? AND ?
              AND lo.deleted_at IS NULL
            ORDER BY bc.book_id, lo.lo_id
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAssignmentRepo;

#[async_trait]
impl AssignmentReader for SqliteAssignmentRepo {
    async fn retrieve_book_assignment_by_interval_time(
        &self,
        conn: &mut SqliteConnection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookAssignment>> {
        let rows = sqlx::query_as::<_, BookAssignment>(
            r#"
            SELECT bc.book_id, t.chapter_id, a.topic_id, a.assignment_id, a.display_order
            FROM assignments a
            JOIN topics t ON t.topic_id = a.topic_id AND t.deleted_at IS NULL
            JOIN books_chapters bc ON bc.chapter_id = t.chapter_id AND bc.deleted_at IS NULL
            WHERE a.updated_at BETWEEN ? AND ?
              AND a.deleted_at IS NULL
            ORDER BY bc.book_id, a.assignment_id
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}
