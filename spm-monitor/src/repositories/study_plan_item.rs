//! Study-plan items and their learning-item join rows

use super::{json_id_set, INSERT_BATCH_SIZE};
use async_trait::async_trait;
use spm_common::db::{AssignmentStudyPlanItem, LoStudyPlanItem, StudyPlanItem, StudyPlanItemLearningItem};
use spm_common::Result;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

#[async_trait]
pub trait StudyPlanItemStore: Send + Sync {
    /// Live items of the given books that bind one of `lo_ids` or `assignment_ids`
    async fn retrieve_by_book_content(
        &self,
        conn: &mut SqliteConnection,
        book_ids: &[String],
        lo_ids: &[String],
        assignment_ids: &[String],
    ) -> Result<Vec<StudyPlanItemLearningItem>>;

    /// The item of master plan `master_study_plan_id` at `content_structure_flatten`
    async fn find_master_item(
        &self,
        conn: &mut SqliteConnection,
        master_study_plan_id: &str,
        content_structure_flatten: &str,
    ) -> Result<Option<StudyPlanItem>>;

    /// Insert items, skipping any whose (plan, content key) already exists.
    /// Returns the ids that were actually written.
    async fn bulk_sync(&self, conn: &mut SqliteConnection, items: &[StudyPlanItem]) -> Result<Vec<String>>;
}

#[async_trait]
pub trait LoStudyPlanItemWriter: Send + Sync {
    async fn bulk_insert(&self, conn: &mut SqliteConnection, rows: &[LoStudyPlanItem]) -> Result<u64>;
}

#[async_trait]
pub trait AssignmentStudyPlanItemWriter: Send + Sync {
    async fn bulk_insert(&self, conn: &mut SqliteConnection, rows: &[AssignmentStudyPlanItem]) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteStudyPlanItemRepo;

#[async_trait]
impl StudyPlanItemStore for SqliteStudyPlanItemRepo {
    async fn retrieve_by_book_content(
        &self,
        conn: &mut SqliteConnection,
        book_ids: &[String],
        lo_ids: &[String],
        assignment_ids: &[String],
    ) -> Result<Vec<StudyPlanItemLearningItem>> {
        if book_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, StudyPlanItemLearningItem>(
            r#"
            SELECT study_plan_item_id,
                   study_plan_id,
                   json_extract(content_structure, '$.lo_id') AS lo_id,
                   json_extract(content_structure, '$.assignment_id') AS assignment_id
            FROM study_plan_items
            WHERE deleted_at IS NULL
              AND json_extract(content_structure, '$.book_id') IN (SELECT value FROM json_each(?))
              AND (
                json_extract(content_structure, '$.lo_id') IN (SELECT value FROM json_each(?))
                OR json_extract(content_structure, '$.assignment_id') IN (SELECT value FROM json_each(?))
              )
            "#,
        )
        .bind(json_id_set(book_ids)?)
        .bind(json_id_set(lo_ids)?)
        .bind(json_id_set(assignment_ids)?)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    async fn find_master_item(
        &self,
        conn: &mut SqliteConnection,
        master_study_plan_id: &str,
        content_structure_flatten: &str,
    ) -> Result<Option<StudyPlanItem>> {
        let item = sqlx::query_as::<_, StudyPlanItem>(
            r#"
            SELECT study_plan_item_id, study_plan_id, copy_study_plan_item_id, content_structure,
                   content_structure_flatten, display_order, status, school_date,
                   created_at, updated_at
            FROM study_plan_items
            WHERE study_plan_id = ?
              AND content_structure_flatten = ?
              AND deleted_at IS NULL
            "#,
        )
        .bind(master_study_plan_id)
        .bind(content_structure_flatten)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(item)
    }

    async fn bulk_sync(&self, conn: &mut SqliteConnection, items: &[StudyPlanItem]) -> Result<Vec<String>> {
        let mut inserted = Vec::with_capacity(items.len());

        for chunk in items.chunks(INSERT_BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO study_plan_items (study_plan_item_id, study_plan_id, copy_study_plan_item_id, \
                 content_structure, content_structure_flatten, display_order, status, school_date, \
                 created_at, updated_at) ",
            );
            qb.push_values(chunk, |mut b, item| {
                b.push_bind(item.study_plan_item_id.clone())
                    .push_bind(item.study_plan_id.clone())
                    .push_bind(item.copy_study_plan_item_id.clone())
                    .push_bind(Json(item.content_structure.0.clone()))
                    .push_bind(item.content_structure_flatten.clone())
                    .push_bind(item.display_order)
                    .push_bind(item.status.clone())
                    .push_bind(item.school_date)
                    .push_bind(item.created_at)
                    .push_bind(item.updated_at);
            });
            qb.push(" ON CONFLICT DO NOTHING RETURNING study_plan_item_id");

            let ids: Vec<String> = qb.build_query_scalar().fetch_all(&mut *conn).await?;
            inserted.extend(ids);
        }

        debug!(
            requested = items.len(),
            inserted = inserted.len(),
            "Synced study plan items"
        );
        Ok(inserted)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteLoStudyPlanItemRepo;

#[async_trait]
impl LoStudyPlanItemWriter for SqliteLoStudyPlanItemRepo {
    async fn bulk_insert(&self, conn: &mut SqliteConnection, rows: &[LoStudyPlanItem]) -> Result<u64> {
        let mut affected = 0;

        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO lo_study_plan_items (lo_id, study_plan_item_id, created_at, updated_at) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.lo_id.clone())
                    .push_bind(row.study_plan_item_id.clone())
                    .push_bind(row.created_at)
                    .push_bind(row.updated_at);
            });
            qb.push(" ON CONFLICT DO NOTHING");

            affected += qb.build().execute(&mut *conn).await?.rows_affected();
        }

        Ok(affected)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAssignmentStudyPlanItemRepo;

#[async_trait]
impl AssignmentStudyPlanItemWriter for SqliteAssignmentStudyPlanItemRepo {
    async fn bulk_insert(&self, conn: &mut SqliteConnection, rows: &[AssignmentStudyPlanItem]) -> Result<u64> {
        let mut affected = 0;

        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO assignment_study_plan_items (assignment_id, study_plan_item_id, created_at, updated_at) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.assignment_id.clone())
                    .push_bind(row.study_plan_item_id.clone())
                    .push_bind(row.created_at)
                    .push_bind(row.updated_at);
            });
            qb.push(" ON CONFLICT DO NOTHING");

            affected += qb.build().execute(&mut *conn).await?.rows_affected();
        }

        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spm_common::db::{ContentStructure, STUDY_PLAN_ITEM_STATUS_ACTIVE};
    use spm_common::time;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        spm_common::db::create_schema(&pool).await.unwrap();

        let now = time::now();
        sqlx::query(
            "INSERT INTO study_plans (study_plan_id, study_plan_type, course_id, book_id, created_at, updated_at) \
             VALUES ('sp-1', 'STUDY_PLAN_TYPE_COURSE', 'course-1', 'book-1', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn item(id: &str, lo_id: &str) -> StudyPlanItem {
        let now = time::now();
        let cs = ContentStructure {
            course_id: "course-1".to_string(),
            book_id: "book-1".to_string(),
            chapter_id: "chapter-1".to_string(),
            topic_id: "topic-1".to_string(),
            lo_id: Some(lo_id.to_string()),
            assignment_id: None,
        };
        StudyPlanItem {
            study_plan_item_id: id.to_string(),
            study_plan_id: "sp-1".to_string(),
            copy_study_plan_item_id: None,
            content_structure: Json(cs),
            content_structure_flatten: format!("flatten::{}", lo_id),
            display_order: 0,
            status: STUDY_PLAN_ITEM_STATUS_ACTIVE.to_string(),
            school_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_bulk_sync_reports_only_new_rows() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let repo = SqliteStudyPlanItemRepo;

        let first = repo.bulk_sync(&mut conn, &[item("spi-1", "lo-1")]).await.unwrap();
        assert_eq!(first, vec!["spi-1".to_string()]);

        // Same (plan, key) under a new id is skipped, a new key is written
        let second = repo
            .bulk_sync(&mut conn, &[item("spi-2", "lo-1"), item("spi-3", "lo-2")])
            .await
            .unwrap();
        assert_eq!(second, vec!["spi-3".to_string()]);
    }

    #[tokio::test]
    async fn test_retrieve_by_book_content_and_find_master() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let repo = SqliteStudyPlanItemRepo;

        repo.bulk_sync(&mut conn, &[item("spi-1", "lo-1"), item("spi-2", "lo-2")])
            .await
            .unwrap();

        let found = repo
            .retrieve_by_book_content(&mut conn, &["book-1".to_string()], &["lo-1".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].lo_id.as_deref(), Some("lo-1"));
        assert!(found[0].assignment_id.is_none());

        let master = repo
            .find_master_item(&mut conn, "sp-1", "flatten::lo-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(master.study_plan_item_id, "spi-2");
        assert_eq!(master.content_structure.0.lo_id.as_deref(), Some("lo-2"));

        assert!(repo
            .find_master_item(&mut conn, "sp-1", "flatten::missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_join_rows_ignore_duplicates() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        SqliteStudyPlanItemRepo
            .bulk_sync(&mut conn, &[item("spi-1", "lo-1")])
            .await
            .unwrap();

        let now = time::now();
        let row = LoStudyPlanItem {
            lo_id: "lo-1".to_string(),
            study_plan_item_id: "spi-1".to_string(),
            created_at: now,
            updated_at: now,
        };
        let writer = SqliteLoStudyPlanItemRepo;
        assert_eq!(writer.bulk_insert(&mut conn, &[row.clone()]).await.unwrap(), 1);
        assert_eq!(writer.bulk_insert(&mut conn, &[row]).await.unwrap(), 0);
    }
}
