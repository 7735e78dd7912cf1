//! Database Test Utilities
//!
//! In-memory store plus seeders for the source-of-truth tables. Timestamps are
//! always bound as `DateTime<Utc>` so they compare correctly with the window
//! bounds the service computes.

use chrono::{DateTime, Duration, Utc};
use spm_common::config::MonitorConfig;
use spm_common::db::{ContentStructure, StudyPlanType, STUDY_PLAN_ITEM_STATUS_ACTIVE};
use spm_monitor::alert::AlertSink;
use spm_monitor::content_structure::ContentStructureKey;
use spm_monitor::ledger::LearningItem;
use spm_monitor::repositories::Repositories;
use spm_monitor::StudyPlanMonitorService;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::types::Json;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Poll interval used throughout the tests
pub const INTERVAL: u32 = 15;

pub const ORG_ID: &str = "org-1";

/// Single-connection in-memory database with the full schema
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    spm_common::db::create_schema(&pool).await.unwrap();
    pool
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

/// Well inside the detection window for `INTERVAL`
pub fn in_window() -> DateTime<Utc> {
    minutes_ago(5)
}

pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        school_name: "Test School".to_string(),
        environment: "test".to_string(),
        organization_id: ORG_ID.to_string(),
        student_course_interval_minutes: INTERVAL,
        learning_item_interval_minutes: INTERVAL,
        ..MonitorConfig::default()
    }
}

pub fn build_service(pool: &SqlitePool, alert: Arc<dyn AlertSink>) -> StudyPlanMonitorService {
    StudyPlanMonitorService::new(pool.clone(), test_config(), alert)
}

pub fn build_service_with(
    pool: &SqlitePool,
    alert: Arc<dyn AlertSink>,
    repos: Repositories,
) -> StudyPlanMonitorService {
    build_service(pool, alert).with_repositories(repos)
}

pub async fn seed_enrollment(pool: &SqlitePool, course_id: &str, student_id: &str, updated_at: DateTime<Utc>) {
    sqlx::query(
        "INSERT INTO course_students (course_id, student_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(course_id)
    .bind(student_id)
    .bind(updated_at)
    .bind(updated_at)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_master_plan(pool: &SqlitePool, study_plan_id: &str, course_id: &str, book_id: &str) {
    seed_plan(pool, study_plan_id, None, StudyPlanType::Course, course_id, book_id).await;
}

/// Individual plan copied from `master_id`, owned by `student_id`
pub async fn seed_individual_plan(
    pool: &SqlitePool,
    study_plan_id: &str,
    master_id: &str,
    course_id: &str,
    book_id: &str,
    student_id: &str,
) {
    seed_plan(
        pool,
        study_plan_id,
        Some(master_id),
        StudyPlanType::Individual,
        course_id,
        book_id,
    )
    .await;
    seed_student_study_plan(pool, study_plan_id, student_id, Some(master_id)).await;
}

pub async fn seed_plan(
    pool: &SqlitePool,
    study_plan_id: &str,
    master_id: Option<&str>,
    plan_type: StudyPlanType,
    course_id: &str,
    book_id: &str,
) {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO study_plans
            (study_plan_id, master_study_plan_id, study_plan_type, course_id, book_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(study_plan_id)
    .bind(master_id)
    .bind(plan_type.as_str())
    .bind(course_id)
    .bind(book_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_student_study_plan(
    pool: &SqlitePool,
    study_plan_id: &str,
    student_id: &str,
    master_id: Option<&str>,
) {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO student_study_plans (study_plan_id, student_id, master_study_plan_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(study_plan_id)
    .bind(student_id)
    .bind(master_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
}

/// Book → chapter → topic
pub async fn seed_book_topic(pool: &SqlitePool, book_id: &str, chapter_id: &str, topic_id: &str) {
    let now = Utc::now();
    sqlx::query(
        "INSERT OR IGNORE INTO books_chapters (book_id, chapter_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(book_id)
    .bind(chapter_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT OR IGNORE INTO topics (topic_id, chapter_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(topic_id)
    .bind(chapter_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_lo(
    pool: &SqlitePool,
    lo_id: &str,
    topic_id: &str,
    display_order: i32,
    updated_at: DateTime<Utc>,
) {
    sqlx::query(
        "INSERT INTO learning_objectives (lo_id, topic_id, display_order, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(lo_id)
    .bind(topic_id)
    .bind(display_order)
    .bind(updated_at)
    .bind(updated_at)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_assignment(
    pool: &SqlitePool,
    assignment_id: &str,
    topic_id: &str,
    display_order: i32,
    updated_at: DateTime<Utc>,
) {
    sqlx::query(
        "INSERT INTO assignments (assignment_id, topic_id, display_order, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(assignment_id)
    .bind(topic_id)
    .bind(display_order)
    .bind(updated_at)
    .bind(updated_at)
    .execute(pool)
    .await
    .unwrap();
}

pub fn locator(course_id: &str, book_id: &str, chapter_id: &str, topic_id: &str, item: &LearningItem) -> ContentStructure {
    let (lo_id, assignment_id) = match item {
        LearningItem::LearningObjective(id) => (Some(id.clone()), None),
        LearningItem::Assignment(id) => (None, Some(id.clone())),
    };
    ContentStructure {
        course_id: course_id.to_string(),
        book_id: book_id.to_string(),
        chapter_id: chapter_id.to_string(),
        topic_id: topic_id.to_string(),
        lo_id,
        assignment_id,
    }
}

/// Flattened key the remediator computes for `item` at `cs`
pub fn flatten(cs: &ContentStructure, item: &LearningItem) -> String {
    ContentStructureKey::new(cs, item).into_string()
}

/// Existing study-plan item for `item` in `study_plan_id`
pub async fn seed_item(
    pool: &SqlitePool,
    study_plan_item_id: &str,
    study_plan_id: &str,
    cs: ContentStructure,
    item: &LearningItem,
    school_date: Option<DateTime<Utc>>,
) {
    let now = Utc::now();
    let flattened = flatten(&cs, item);
    sqlx::query(
        r#"
        INSERT INTO study_plan_items
            (study_plan_item_id, study_plan_id, content_structure, content_structure_flatten,
             display_order, status, school_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?)
        "#,
    )
    .bind(study_plan_item_id)
    .bind(study_plan_id)
    .bind(Json(cs))
    .bind(flattened)
    .bind(STUDY_PLAN_ITEM_STATUS_ACTIVE)
    .bind(school_date)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
