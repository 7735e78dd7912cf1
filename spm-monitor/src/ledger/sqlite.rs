//! SQLite-backed monitor ledger

use super::{MonitorLedger, MonitorPayload, MonitorRecord, MonitorType, RetrieveFilter};
use crate::repositories::json_id_set;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spm_common::{time, Error, Result};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

/// Rows per INSERT statement; 10 binds per row stays well under SQLite's
/// host-parameter limit
const UPSERT_BATCH_SIZE: usize = 500;

const SELECT_COLUMNS: &str = r#"
    SELECT study_plan_monitor_id, student_id, course_id, type, payload, level,
           created_at, updated_at, deleted_at, auto_resolved_at
    FROM study_plan_monitors
"#;

#[derive(Debug, FromRow)]
struct MonitorRow {
    study_plan_monitor_id: String,
    student_id: Option<String>,
    course_id: String,
    #[sqlx(rename = "type")]
    monitor_type: String,
    payload: String,
    level: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    auto_resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<MonitorRow> for MonitorRecord {
    type Error = Error;

    fn try_from(row: MonitorRow) -> Result<Self> {
        let monitor_type: MonitorType = row.monitor_type.parse()?;
        let payload: MonitorPayload = serde_json::from_str(&row.payload)?;
        if payload.monitor_type() != monitor_type {
            return Err(Error::InvalidInput(format!(
                "Monitor {} has type {} but a {} payload",
                row.study_plan_monitor_id,
                monitor_type,
                payload.monitor_type()
            )));
        }

        Ok(MonitorRecord {
            id: row.study_plan_monitor_id,
            student_id: row.student_id,
            course_id: row.course_id,
            payload,
            level: row.level,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            auto_resolved_at: row.auto_resolved_at,
        })
    }
}

/// `MonitorLedger` over the `study_plan_monitors` table
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteMonitorLedger;

#[async_trait]
impl MonitorLedger for SqliteMonitorLedger {
    async fn bulk_upsert(&self, conn: &mut SqliteConnection, records: &[MonitorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        // Serialize up front so a bad payload fails before anything is written
        let rows = records
            .iter()
            .map(|r| -> Result<_> { Ok((r, serde_json::to_string(&r.payload)?)) })
            .collect::<Result<Vec<_>>>()?;

        for chunk in rows.chunks(UPSERT_BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO study_plan_monitors (study_plan_monitor_id, student_id, course_id, type, \
                 payload, level, created_at, updated_at, deleted_at, auto_resolved_at) ",
            );
            qb.push_values(chunk, |mut b, (record, payload)| {
                b.push_bind(record.id.clone())
                    .push_bind(record.student_id.clone())
                    .push_bind(record.course_id.clone())
                    .push_bind(record.monitor_type().as_str())
                    .push_bind(payload.clone())
                    .push_bind(record.level.clone())
                    .push_bind(record.created_at)
                    .push_bind(record.updated_at)
                    .push_bind(record.deleted_at)
                    .push_bind(record.auto_resolved_at);
            });
            qb.push(
                " ON CONFLICT(study_plan_monitor_id) DO UPDATE SET \
                 payload = excluded.payload, \
                 level = excluded.level, \
                 updated_at = excluded.updated_at, \
                 deleted_at = excluded.deleted_at, \
                 auto_resolved_at = excluded.auto_resolved_at",
            );

            qb.build().execute(&mut *conn).await?;
        }

        debug!(count = records.len(), "Upserted monitor records");
        Ok(())
    }

    async fn retrieve_by_filter(
        &self,
        conn: &mut SqliteConnection,
        filter: &RetrieveFilter,
    ) -> Result<Vec<MonitorRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        qb.push(" WHERE 1 = 1");

        if let Some(monitor_type) = filter.monitor_type {
            qb.push(" AND type = ").push_bind(monitor_type.as_str());
        }
        if let Some(ids) = &filter.ids {
            qb.push(" AND study_plan_monitor_id IN (SELECT value FROM json_each(")
                .push_bind(json_id_set(ids)?)
                .push("))");
        }
        if let Some((from, to)) = filter.updated_between {
            qb.push(" AND updated_at BETWEEN ")
                .push_bind(from)
                .push(" AND ")
                .push_bind(to);
        }
        if !filter.include_deleted {
            qb.push(" AND deleted_at IS NULL");
        }
        if !filter.include_resolved {
            qb.push(" AND auto_resolved_at IS NULL");
        }
        qb.push(" ORDER BY created_at, study_plan_monitor_id");

        let rows: Vec<MonitorRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
        rows.into_iter().map(MonitorRecord::try_from).collect()
    }

    async fn soft_delete(&self, conn: &mut SqliteConnection, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = time::now();
        let result = sqlx::query(
            r#"
            UPDATE study_plan_monitors
            SET deleted_at = ?, updated_at = ?
            WHERE study_plan_monitor_id IN (SELECT value FROM json_each(?))
              AND deleted_at IS NULL
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(json_id_set(ids)?)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    async fn soft_delete_by_type(
        &self,
        conn: &mut SqliteConnection,
        monitor_type: MonitorType,
        updated_before: DateTime<Utc>,
    ) -> Result<u64> {
        let now = time::now();
        let result = sqlx::query(
            r#"
            UPDATE study_plan_monitors
            SET deleted_at = ?, updated_at = ?
            WHERE type = ?
              AND updated_at < ?
              AND deleted_at IS NULL
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(monitor_type.as_str())
        .bind(updated_before)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_auto_resolved(&self, conn: &mut SqliteConnection, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = time::now();
        let result = sqlx::query(
            r#"
            UPDATE study_plan_monitors
            SET auto_resolved_at = ?, updated_at = ?
            WHERE study_plan_monitor_id IN (SELECT value FROM json_each(?))
              AND auto_resolved_at IS NULL
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(json_id_set(ids)?)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LearningItem, LearningItemDriftPayload};
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        spm_common::db::create_schema(&pool).await.unwrap();
        pool
    }

    fn lo_drift(now: DateTime<Utc>) -> MonitorRecord {
        MonitorRecord::learning_item_drift(
            "course-1",
            Some("student-1"),
            LearningItemDriftPayload {
                book_id: "book-1".to_string(),
                study_plan_id: "sp-1".to_string(),
                master_study_plan_id: Some("msp-1".to_string()),
                chapter_id: "chapter-1".to_string(),
                topic_id: "topic-1".to_string(),
                display_order: 1,
                item: LearningItem::LearningObjective("lo-1".to_string()),
            },
            now,
        )
    }

    #[tokio::test]
    async fn test_upsert_then_retrieve() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let ledger = SqliteMonitorLedger;
        let now = time::now();

        let records = vec![
            MonitorRecord::enrollment_drift("course-1", "student-1", "msp-1", now),
            lo_drift(now),
        ];
        ledger.bulk_upsert(&mut conn, &records).await.unwrap();

        let all = ledger
            .retrieve_by_filter(&mut conn, &RetrieveFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let drift = ledger
            .retrieve_by_filter(&mut conn, &RetrieveFilter::open(Some(MonitorType::LearningItemDrift)))
            .await
            .unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].payload, records[1].payload);
    }

    #[tokio::test]
    async fn test_upsert_same_id_updates_in_place() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let ledger = SqliteMonitorLedger;

        let mut record =
            MonitorRecord::enrollment_drift("course-1", "student-1", "msp-1", time::now());
        ledger.bulk_upsert(&mut conn, &[record.clone()]).await.unwrap();

        record.level = Some("high".to_string());
        ledger.bulk_upsert(&mut conn, &[record.clone()]).await.unwrap();

        let all = ledger
            .retrieve_by_filter(&mut conn, &RetrieveFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].level.as_deref(), Some("high"));
    }

    #[tokio::test]
    async fn test_soft_delete_by_type_only_touches_old_records_of_type() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let ledger = SqliteMonitorLedger;
        let now = time::now();

        let old = MonitorRecord::enrollment_drift("course-1", "student-1", "msp-1", now - Duration::minutes(60));
        let young = MonitorRecord::enrollment_drift("course-1", "student-2", "msp-1", now - Duration::minutes(2));
        let old_other_type = lo_drift(now - Duration::minutes(60));
        ledger
            .bulk_upsert(&mut conn, &[old.clone(), young.clone(), old_other_type.clone()])
            .await
            .unwrap();

        let expired = ledger
            .soft_delete_by_type(&mut conn, MonitorType::EnrollmentDrift, now - Duration::minutes(31))
            .await
            .unwrap();
        assert_eq!(expired, 1);

        let live = ledger
            .retrieve_by_filter(&mut conn, &RetrieveFilter::default())
            .await
            .unwrap();
        let live_ids: Vec<&str> = live.iter().map(|r| r.id.as_str()).collect();
        assert!(!live_ids.contains(&old.id.as_str()));
        assert!(live_ids.contains(&young.id.as_str()));
        assert!(live_ids.contains(&old_other_type.id.as_str()));

        let with_deleted = ledger
            .retrieve_by_filter(
                &mut conn,
                &RetrieveFilter {
                    ids: Some(vec![old.id.clone()]),
                    include_deleted: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(with_deleted.len(), 1);
        assert!(with_deleted[0].deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_mark_auto_resolved_hides_from_open_filter() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let ledger = SqliteMonitorLedger;

        let record = lo_drift(time::now());
        ledger.bulk_upsert(&mut conn, &[record.clone()]).await.unwrap();

        let marked = ledger
            .mark_auto_resolved(&mut conn, &[record.id.clone()])
            .await
            .unwrap();
        assert_eq!(marked, 1);

        // Second mark is a no-op
        let marked = ledger
            .mark_auto_resolved(&mut conn, &[record.id.clone()])
            .await
            .unwrap();
        assert_eq!(marked, 0);

        let open = ledger
            .retrieve_by_filter(&mut conn, &RetrieveFilter::open(None))
            .await
            .unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete_by_ids() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let ledger = SqliteMonitorLedger;
        let now = time::now();

        let a = MonitorRecord::enrollment_drift("course-1", "student-1", "msp-1", now);
        let b = MonitorRecord::enrollment_drift("course-1", "student-2", "msp-1", now);
        ledger.bulk_upsert(&mut conn, &[a.clone(), b.clone()]).await.unwrap();

        assert_eq!(ledger.soft_delete(&mut conn, &[a.id.clone()]).await.unwrap(), 1);
        assert_eq!(ledger.soft_delete(&mut conn, &[]).await.unwrap(), 0);

        let live = ledger
            .retrieve_by_filter(&mut conn, &RetrieveFilter::default())
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, b.id);
    }
}
