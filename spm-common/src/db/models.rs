//! Database models
//!
//! Row shapes of the tables the monitor reads (enrollments, study plans,
//! course content) and writes (study-plan items and their join rows).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// `study_plans.study_plan_type` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudyPlanType {
    /// Course-level template plan
    #[serde(rename = "STUDY_PLAN_TYPE_COURSE")]
    Course,
    /// Per-student copy of a course plan
    #[serde(rename = "STUDY_PLAN_TYPE_INDIVIDUAL")]
    Individual,
}

impl StudyPlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyPlanType::Course => "STUDY_PLAN_TYPE_COURSE",
            StudyPlanType::Individual => "STUDY_PLAN_TYPE_INDIVIDUAL",
        }
    }
}

pub const STUDY_PLAN_ITEM_STATUS_ACTIVE: &str = "STUDY_PLAN_ITEM_STATUS_ACTIVE";

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CourseStudent {
    pub course_id: String,
    pub student_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StudyPlan {
    pub study_plan_id: String,
    pub master_study_plan_id: Option<String>,
    pub course_id: String,
    pub book_id: Option<String>,
    pub study_plan_type: String,
}

/// A study plan joined with the student that owns it
///
/// Master plans have no owning student, so `student_id` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StudyPlanCombineStudent {
    pub study_plan_id: String,
    pub master_study_plan_id: Option<String>,
    pub course_id: String,
    pub book_id: String,
    pub student_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StudentStudyPlan {
    pub study_plan_id: String,
    pub student_id: String,
    pub master_study_plan_id: Option<String>,
}

/// A learning objective with its position inside a book
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BookLearningObjective {
    pub book_id: String,
    pub chapter_id: String,
    pub topic_id: String,
    pub lo_id: String,
    pub display_order: i32,
}

/// An assignment with its position inside a book
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BookAssignment {
    pub book_id: String,
    pub chapter_id: String,
    pub topic_id: String,
    pub assignment_id: String,
    pub display_order: i32,
}

/// Locator of one learning item inside a course's book tree
///
/// Stored as JSON in `study_plan_items.content_structure`. Exactly one of
/// `lo_id` / `assignment_id` is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentStructure {
    pub course_id: String,
    pub book_id: String,
    pub chapter_id: String,
    pub topic_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StudyPlanItem {
    pub study_plan_item_id: String,
    pub study_plan_id: String,
    pub copy_study_plan_item_id: Option<String>,
    pub content_structure: Json<ContentStructure>,
    pub content_structure_flatten: String,
    pub display_order: i32,
    pub status: String,
    pub school_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Existing study-plan item reduced to the (plan, learning item) pair it binds
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StudyPlanItemLearningItem {
    pub study_plan_item_id: String,
    pub study_plan_id: String,
    pub lo_id: Option<String>,
    pub assignment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LoStudyPlanItem {
    pub lo_id: String,
    pub study_plan_item_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AssignmentStudyPlanItem {
    pub assignment_id: String,
    pub study_plan_item_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_structure_omits_absent_item_id() {
        let cs = ContentStructure {
            course_id: "course-1".to_string(),
            book_id: "book-1".to_string(),
            chapter_id: "chapter-1".to_string(),
            topic_id: "topic-1".to_string(),
            lo_id: Some("lo-1".to_string()),
            assignment_id: None,
        };

        let json = serde_json::to_value(&cs).unwrap();
        assert_eq!(json["lo_id"], "lo-1");
        assert!(json.get("assignment_id").is_none());
    }

    #[test]
    fn test_study_plan_type_strings() {
        assert_eq!(StudyPlanType::Course.as_str(), "STUDY_PLAN_TYPE_COURSE");
        assert_eq!(
            serde_json::to_string(&StudyPlanType::Individual).unwrap(),
            "\"STUDY_PLAN_TYPE_INDIVIDUAL\""
        );
    }
}
