use super::json_id_set;
use async_trait::async_trait;
use spm_common::db::{StudentStudyPlan, StudyPlan, StudyPlanCombineStudent, StudyPlanType};
use spm_common::Result;
use sqlx::SqliteConnection;

/// Per-student study plans
#[async_trait]
pub trait StudentStudyPlanReader: Send + Sync {
    /// Individual plans of `student_ids` in `course_ids`, with the master each
    /// one was copied from
    async fn retrieve_by_student_course(
        &self,
        conn: &mut SqliteConnection,
        student_ids: &[String],
        course_ids: &[String],
    ) -> Result<Vec<StudentStudyPlan>>;
}

/// Master and individual study plans
#[async_trait]
pub trait StudyPlanReader: Send + Sync {
    /// Course-level (master) plans of the given courses
    async fn retrieve_master_by_course_ids(
        &self,
        conn: &mut SqliteConnection,
        course_ids: &[String],
    ) -> Result<Vec<StudyPlan>>;

    /// Every plan built from the given books: master plans with no student,
    /// individual plans with the student that owns them
    async fn retrieve_combine_student(
        &self,
        conn: &mut SqliteConnection,
        book_ids: &[String],
    ) -> Result<Vec<StudyPlanCombineStudent>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteStudentStudyPlanRepo;

#[async_trait]
impl StudentStudyPlanReader for SqliteStudentStudyPlanRepo {
    async fn retrieve_by_student_course(
        &self,
        conn: &mut SqliteConnection,
        student_ids: &[String],
        course_ids: &[String],
    ) -> Result<Vec<StudentStudyPlan>> {
        if student_ids.is_empty() || course_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, StudentStudyPlan>(
            r#"
            SELECT ssp.study_plan_id,
                   ssp.student_id,
                   COALESCE(ssp.master_study_plan_id, sp.master_study_plan_id) AS master_study_plan_id
            FROM student_study_plans ssp
            JOIN study_plans sp ON sp.study_plan_id = ssp.study_plan_id
            WHERE ssp.student_id IN (SELECT value FROM json_each(?))
              AND sp.course_id IN (SELECT value FROM json_each(?))
              AND ssp.deleted_at IS NULL
              AND sp.deleted_at IS NULL
            "#,
        )
        .bind(json_id_set(student_ids)?)
        .bind(json_id_set(course_ids)?)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteStudyPlanRepo;

#[async_trait]
impl StudyPlanReader for SqliteStudyPlanRepo {
    async fn retrieve_master_by_course_ids(
        &self,
        conn: &mut SqliteConnection,
        course_ids: &[String],
    ) -> Result<Vec<StudyPlan>> {
        if course_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, StudyPlan>(
            r#"
            SELECT study_plan_id, master_study_plan_id, course_id, book_id, study_plan_type
            FROM study_plans
            WHERE course_id IN (SELECT value FROM json_each(?))
              AND study_plan_type = ?
              AND deleted_at IS NULL
            ORDER BY course_id, study_plan_id
            "#,
        )
        .bind(json_id_set(course_ids)?)
        .bind(StudyPlanType::Course.as_str())
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    async fn retrieve_combine_student(
        &self,
        conn: &mut SqliteConnection,
        book_ids: &[String],
    ) -> Result<Vec<StudyPlanCombineStudent>> {
        if book_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Individual plans without an owning student are skipped: they would
        // otherwise be mistaken for masters
        let rows = sqlx::query_as::<_, StudyPlanCombineStudent>(
            r#"
            SELECT sp.study_plan_id, sp.master_study_plan_id, sp.course_id, sp.book_id, ssp.student_id
            FROM study_plans sp
            LEFT JOIN student_study_plans ssp
              ON ssp.study_plan_id = sp.study_plan_id
             AND ssp.deleted_at IS NULL
            WHERE sp.book_id IN (SELECT value FROM json_each(?))
              AND sp.deleted_at IS NULL
              AND (sp.study_plan_type = ? OR ssp.student_id IS NOT NULL)
            ORDER BY sp.study_plan_id
            "#,
        )
        .bind(json_id_set(book_ids)?)
        .bind(StudyPlanType::Course.as_str())
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}
