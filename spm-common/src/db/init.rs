//! Database initialization
//!
//! Opens (or creates) the SQLite database, applies connection pragmas and
//! creates every table the monitor reads or writes.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL lets the detector read while the remediator holds the write lock
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    // Source-of-truth tables (owned by upstream services, read here)
    create_course_students_table(pool).await?;
    create_study_plans_table(pool).await?;
    create_student_study_plans_table(pool).await?;
    create_books_chapters_table(pool).await?;
    create_topics_table(pool).await?;
    create_learning_objectives_table(pool).await?;
    create_assignments_table(pool).await?;

    // Derived tables (synthesized by the remediator)
    create_study_plan_items_table(pool).await?;
    create_lo_study_plan_items_table(pool).await?;
    create_assignment_study_plan_items_table(pool).await?;

    // Monitor ledger
    create_study_plan_monitors_table(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Course enrollment: one row per (course, student)
pub async fn create_course_students_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_students (
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            start_at TIMESTAMP,
            end_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP,
            PRIMARY KEY (course_id, student_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_course_students_updated_at ON course_students(updated_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Study plans: master rows have no master_study_plan_id,
/// individual rows point at the master they were copied from
pub async fn create_study_plans_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS study_plans (
            study_plan_id TEXT PRIMARY KEY,
            master_study_plan_id TEXT REFERENCES study_plans(study_plan_id),
            name TEXT NOT NULL DEFAULT '',
            study_plan_type TEXT NOT NULL,
            course_id TEXT NOT NULL,
            book_id TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_study_plans_book_id ON study_plans(book_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_study_plans_course_id ON study_plans(course_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_student_study_plans_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS student_study_plans (
            study_plan_id TEXT NOT NULL REFERENCES study_plans(study_plan_id),
            student_id TEXT NOT NULL,
            master_study_plan_id TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP,
            PRIMARY KEY (study_plan_id, student_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_books_chapters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books_chapters (
            book_id TEXT NOT NULL,
            chapter_id TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP,
            PRIMARY KEY (book_id, chapter_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_topics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topics (
            topic_id TEXT PRIMARY KEY,
            chapter_id TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            display_order INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_learning_objectives_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS learning_objectives (
            lo_id TEXT PRIMARY KEY,
            topic_id TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            display_order INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_learning_objectives_updated_at ON learning_objectives(updated_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assignments (
            assignment_id TEXT PRIMARY KEY,
            topic_id TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            display_order INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_assignments_updated_at ON assignments(updated_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Study-plan items: one live row per (plan, content-structure key)
pub async fn create_study_plan_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS study_plan_items (
            study_plan_item_id TEXT PRIMARY KEY,
            study_plan_id TEXT NOT NULL REFERENCES study_plans(study_plan_id),
            copy_study_plan_item_id TEXT REFERENCES study_plan_items(study_plan_item_id),
            content_structure TEXT NOT NULL,
            content_structure_flatten TEXT NOT NULL,
            display_order INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            school_date TIMESTAMP,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_study_plan_items_plan_content
        ON study_plan_items(study_plan_id, content_structure_flatten)
        WHERE deleted_at IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_lo_study_plan_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lo_study_plan_items (
            lo_id TEXT NOT NULL,
            study_plan_item_id TEXT NOT NULL REFERENCES study_plan_items(study_plan_item_id),
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP,
            PRIMARY KEY (lo_id, study_plan_item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_assignment_study_plan_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assignment_study_plan_items (
            assignment_id TEXT NOT NULL,
            study_plan_item_id TEXT NOT NULL REFERENCES study_plan_items(study_plan_item_id),
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP,
            PRIMARY KEY (assignment_id, study_plan_item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Monitor ledger: append-mostly, soft-deletable anomaly log
pub async fn create_study_plan_monitors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS study_plan_monitors (
            study_plan_monitor_id TEXT PRIMARY KEY,
            student_id TEXT,
            course_id TEXT NOT NULL,
            type TEXT NOT NULL,
            payload TEXT NOT NULL,
            level TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP,
            auto_resolved_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
