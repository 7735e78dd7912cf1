//! Monitor ledger
//!
//! Every detected drift becomes one `MonitorRecord`. Records are only ever
//! mutated to set `auto_resolved_at` (remediation wrote the missing rows) or
//! `deleted_at` (the alarm expired); nothing is hard-deleted.

mod sqlite;

pub use sqlite::SqliteMonitorLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spm_common::{uuid_utils, Error, Result};
use sqlx::SqliteConnection;
use std::fmt;
use std::str::FromStr;

/// Kind of anomaly a record describes (the `type` column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorType {
    /// A student is enrolled in a course but has no individual plan for one
    /// of its master plans
    EnrollmentDrift,
    /// A study plan is missing the item for a learning object or assignment
    /// of its book
    LearningItemDrift,
}

impl MonitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::EnrollmentDrift => "ENROLLMENT_DRIFT",
            MonitorType::LearningItemDrift => "LEARNING_ITEM_DRIFT",
        }
    }
}

impl fmt::Display for MonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ENROLLMENT_DRIFT" => Ok(MonitorType::EnrollmentDrift),
            "LEARNING_ITEM_DRIFT" => Ok(MonitorType::LearningItemDrift),
            other => Err(Error::InvalidInput(format!("Unknown monitor type: {}", other))),
        }
    }
}

/// The learning item a study-plan item binds: exactly one of the two ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LearningItem {
    #[serde(rename = "lo_id")]
    LearningObjective(String),
    #[serde(rename = "assignment_id")]
    Assignment(String),
}

impl LearningItem {
    pub fn id(&self) -> &str {
        match self {
            LearningItem::LearningObjective(id) | LearningItem::Assignment(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentDriftPayload {
    pub course_id: String,
    pub student_id: String,
    pub master_study_plan_id: String,
}

/// Enough of the content locator to synthesize the missing item later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningItemDriftPayload {
    pub book_id: String,
    pub study_plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_study_plan_id: Option<String>,
    pub chapter_id: String,
    pub topic_id: String,
    pub display_order: i32,
    #[serde(flatten)]
    pub item: LearningItem,
}

/// Type-specific record payload, stored as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorPayload {
    EnrollmentDrift(EnrollmentDriftPayload),
    LearningItemDrift(LearningItemDriftPayload),
}

impl MonitorPayload {
    pub fn monitor_type(&self) -> MonitorType {
        match self {
            MonitorPayload::EnrollmentDrift(_) => MonitorType::EnrollmentDrift,
            MonitorPayload::LearningItemDrift(_) => MonitorType::LearningItemDrift,
        }
    }
}

/// One row of the monitor ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorRecord {
    pub id: String,
    pub student_id: Option<String>,
    pub course_id: String,
    pub payload: MonitorPayload,
    pub level: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub auto_resolved_at: Option<DateTime<Utc>>,
}

impl MonitorRecord {
    fn open(
        course_id: String,
        student_id: Option<String>,
        payload: MonitorPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid_utils::generate_id(),
            student_id,
            course_id,
            payload,
            level: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            auto_resolved_at: None,
        }
    }

    pub fn enrollment_drift(
        course_id: &str,
        student_id: &str,
        master_study_plan_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self::open(
            course_id.to_string(),
            Some(student_id.to_string()),
            MonitorPayload::EnrollmentDrift(EnrollmentDriftPayload {
                course_id: course_id.to_string(),
                student_id: student_id.to_string(),
                master_study_plan_id: master_study_plan_id.to_string(),
            }),
            now,
        )
    }

    /// `student_id` is `None` when the drift is on a master plan
    pub fn learning_item_drift(
        course_id: &str,
        student_id: Option<&str>,
        payload: LearningItemDriftPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self::open(
            course_id.to_string(),
            student_id.map(str::to_string),
            MonitorPayload::LearningItemDrift(payload),
            now,
        )
    }

    pub fn monitor_type(&self) -> MonitorType {
        self.payload.monitor_type()
    }

    /// Neither expired nor repaired: still needs a human
    pub fn is_open(&self) -> bool {
        self.deleted_at.is_none() && self.auto_resolved_at.is_none()
    }
}

/// Ledger query; unset fields do not filter
#[derive(Debug, Clone, Default)]
pub struct RetrieveFilter {
    pub monitor_type: Option<MonitorType>,
    pub ids: Option<Vec<String>>,
    pub updated_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub include_deleted: bool,
    pub include_resolved: bool,
}

impl RetrieveFilter {
    /// Open records, optionally of one type
    pub fn open(monitor_type: Option<MonitorType>) -> Self {
        Self {
            monitor_type,
            ..Default::default()
        }
    }
}

/// Read/write access to the monitor ledger
#[async_trait]
pub trait MonitorLedger: Send + Sync {
    /// Insert records, or refresh them when the id already exists
    async fn bulk_upsert(&self, conn: &mut SqliteConnection, records: &[MonitorRecord]) -> Result<()>;

    async fn retrieve_by_filter(
        &self,
        conn: &mut SqliteConnection,
        filter: &RetrieveFilter,
    ) -> Result<Vec<MonitorRecord>>;

    /// Soft-delete the given records; returns how many changed
    async fn soft_delete(&self, conn: &mut SqliteConnection, ids: &[String]) -> Result<u64>;

    /// Soft-delete live records of `monitor_type` last updated before `updated_before`
    async fn soft_delete_by_type(
        &self,
        conn: &mut SqliteConnection,
        monitor_type: MonitorType,
        updated_before: DateTime<Utc>,
    ) -> Result<u64>;

    /// Stamp `auto_resolved_at` on the given records
    async fn mark_auto_resolved(&self, conn: &mut SqliteConnection, ids: &[String]) -> Result<u64>;
}
