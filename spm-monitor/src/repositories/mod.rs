//! Repository seams
//!
//! One narrow trait per collaborator the reconciler talks to. Every method
//! takes `&mut SqliteConnection` so the same implementation serves a pooled
//! connection or an open transaction (`tx.conn()`).

mod content;
mod course_student;
mod study_plan;
mod study_plan_item;

pub use content::{AssignmentReader, LearningObjectiveReader, SqliteAssignmentRepo, SqliteLearningObjectiveRepo};
pub use course_student::{CourseStudentReader, SqliteCourseStudentRepo};
pub use study_plan::{
    SqliteStudentStudyPlanRepo, SqliteStudyPlanRepo, StudentStudyPlanReader, StudyPlanReader,
};
pub use study_plan_item::{
    AssignmentStudyPlanItemWriter, LoStudyPlanItemWriter, SqliteAssignmentStudyPlanItemRepo,
    SqliteLoStudyPlanItemRepo, SqliteStudyPlanItemRepo, StudyPlanItemStore,
};

use crate::ledger::{MonitorLedger, SqliteMonitorLedger};
use spm_common::Result;
use std::sync::Arc;

/// Rows per multi-row INSERT; keeps binds under SQLite's host-parameter limit
pub(crate) const INSERT_BATCH_SIZE: usize = 500;

/// Encode an id set as a JSON array for `IN (SELECT value FROM json_each(?))`
pub(crate) fn json_id_set<S: AsRef<str>>(ids: &[S]) -> Result<String> {
    let ids: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
    Ok(serde_json::to_string(&ids)?)
}

/// Every collaborator the service needs
///
/// `Repositories::sqlite()` wires the default implementations; tests swap
/// single fields to inject failures.
#[derive(Clone)]
pub struct Repositories {
    pub course_students: Arc<dyn CourseStudentReader>,
    pub student_study_plans: Arc<dyn StudentStudyPlanReader>,
    pub study_plans: Arc<dyn StudyPlanReader>,
    pub learning_objectives: Arc<dyn LearningObjectiveReader>,
    pub assignments: Arc<dyn AssignmentReader>,
    pub study_plan_items: Arc<dyn StudyPlanItemStore>,
    pub lo_study_plan_items: Arc<dyn LoStudyPlanItemWriter>,
    pub assignment_study_plan_items: Arc<dyn AssignmentStudyPlanItemWriter>,
    pub monitors: Arc<dyn MonitorLedger>,
}

impl Repositories {
    pub fn sqlite() -> Self {
        Self {
            course_students: Arc::new(SqliteCourseStudentRepo),
            student_study_plans: Arc::new(SqliteStudentStudyPlanRepo),
            study_plans: Arc::new(SqliteStudyPlanRepo),
            learning_objectives: Arc::new(SqliteLearningObjectiveRepo),
            assignments: Arc::new(SqliteAssignmentRepo),
            study_plan_items: Arc::new(SqliteStudyPlanItemRepo),
            lo_study_plan_items: Arc::new(SqliteLoStudyPlanItemRepo),
            assignment_study_plan_items: Arc::new(SqliteAssignmentStudyPlanItemRepo),
            monitors: Arc::new(SqliteMonitorLedger),
        }
    }
}

impl Default for Repositories {
    fn default() -> Self {
        Self::sqlite()
    }
}
