//! Learning-item drift: study plans built from a book that lack the item for
//! one of the book's learning objectives or assignments.

use super::StudyPlanMonitorService;
use crate::error::{MonitorResult, StepContext};
use crate::ledger::{LearningItem, LearningItemDriftPayload, MonitorRecord};
use crate::utils::begin_monitored;
use crate::window::IntervalWindow;
use chrono::{DateTime, Utc};
use spm_common::db::{BookAssignment, BookLearningObjective, StudyPlanCombineStudent, StudyPlanItemLearningItem};
use spm_common::time;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// A learning item with its position in a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub chapter_id: String,
    pub topic_id: String,
    pub display_order: i32,
    pub item: LearningItem,
}

/// Changed learning items grouped by book
#[derive(Debug, Clone, Default)]
pub struct BookCatalog {
    books: BTreeMap<String, Vec<CatalogEntry>>,
}

impl BookCatalog {
    pub fn from_rows(los: Vec<BookLearningObjective>, assignments: Vec<BookAssignment>) -> Self {
        let mut books: BTreeMap<String, Vec<CatalogEntry>> = BTreeMap::new();

        for lo in los {
            books.entry(lo.book_id).or_default().push(CatalogEntry {
                chapter_id: lo.chapter_id,
                topic_id: lo.topic_id,
                display_order: lo.display_order,
                item: LearningItem::LearningObjective(lo.lo_id),
            });
        }
        for assignment in assignments {
            books.entry(assignment.book_id).or_default().push(CatalogEntry {
                chapter_id: assignment.chapter_id,
                topic_id: assignment.topic_id,
                display_order: assignment.display_order,
                item: LearningItem::Assignment(assignment.assignment_id),
            });
        }

        Self { books }
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn book_ids(&self) -> Vec<String> {
        self.books.keys().cloned().collect()
    }

    pub fn entries(&self, book_id: &str) -> &[CatalogEntry] {
        self.books.get(book_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Learning-objective ids and assignment ids across all books
    pub fn item_ids(&self) -> (Vec<String>, Vec<String>) {
        let mut lo_ids = Vec::new();
        let mut assignment_ids = Vec::new();
        for entry in self.books.values().flatten() {
            match &entry.item {
                LearningItem::LearningObjective(id) => lo_ids.push(id.clone()),
                LearningItem::Assignment(id) => assignment_ids.push(id.clone()),
            }
        }
        (lo_ids, assignment_ids)
    }
}

impl StudyPlanMonitorService {
    /// Detect and record missing study-plan items, in one transaction
    pub(crate) async fn collect_missing_learning_items(
        &self,
        interval_minutes: u32,
    ) -> MonitorResult<Vec<MonitorRecord>> {
        let window = IntervalWindow::detection(interval_minutes);
        let now = time::now();
        let (from, to) = window.bounds(now);

        let mut tx = begin_monitored(&self.pool, "learning_items::detect")
            .await
            .step("begin detection transaction")?;

        let assignments = self
            .repos
            .assignments
            .retrieve_book_assignment_by_interval_time(tx.conn(), from, to)
            .await
            .step("AssignmentRepo.retrieve_book_assignment_by_interval_time")?;
        let los = self
            .repos
            .learning_objectives
            .retrieve_book_lo_by_interval_time(tx.conn(), from, to)
            .await
            .step("LearningObjectiveRepo.retrieve_book_lo_by_interval_time")?;

        let catalog = BookCatalog::from_rows(los, assignments);
        if catalog.is_empty() {
            debug!(window = %window, "No content changes in window");
            tx.rollback().await.step("rollback detection transaction")?;
            return Ok(Vec::new());
        }

        let book_ids = catalog.book_ids();
        let plans = self
            .repos
            .study_plans
            .retrieve_combine_student(tx.conn(), &book_ids)
            .await
            .step("StudyPlanRepo.retrieve_combine_student")?;
        if plans.is_empty() {
            debug!(books = book_ids.len(), "No study plan uses the changed books");
            tx.rollback().await.step("rollback detection transaction")?;
            return Ok(Vec::new());
        }

        let (lo_ids, assignment_ids) = catalog.item_ids();
        let existing = self
            .repos
            .study_plan_items
            .retrieve_by_book_content(tx.conn(), &book_ids, &lo_ids, &assignment_ids)
            .await
            .step("StudyPlanItemRepo.retrieve_by_book_content")?;

        let records = missing_learning_items(&catalog, &plans, &existing, now);
        if !records.is_empty() {
            self.repos
                .monitors
                .bulk_upsert(tx.conn(), &records)
                .await
                .step("MonitorLedger.bulk_upsert")?;
        }

        tx.commit().await.step("commit detection transaction")?;

        info!(
            books = book_ids.len(),
            plans = plans.len(),
            count = records.len(),
            "Learning item drift detection finished"
        );
        Ok(records)
    }
}

/// One learning-item-drift record per (plan, catalog item of the plan's book)
/// with no existing study-plan item
pub fn missing_learning_items(
    catalog: &BookCatalog,
    plans: &[StudyPlanCombineStudent],
    existing: &[StudyPlanItemLearningItem],
    now: DateTime<Utc>,
) -> Vec<MonitorRecord> {
    let present: HashSet<(&str, LearningItem)> = existing
        .iter()
        .filter_map(|row| {
            let item = match (&row.lo_id, &row.assignment_id) {
                (Some(lo_id), _) => LearningItem::LearningObjective(lo_id.clone()),
                (None, Some(assignment_id)) => LearningItem::Assignment(assignment_id.clone()),
                (None, None) => return None,
            };
            Some((row.study_plan_id.as_str(), item))
        })
        .collect();

    let mut records = Vec::new();
    for plan in plans {
        for entry in catalog.entries(&plan.book_id) {
            if present.contains(&(plan.study_plan_id.as_str(), entry.item.clone())) {
                continue;
            }

            let payload = LearningItemDriftPayload {
                book_id: plan.book_id.clone(),
                study_plan_id: plan.study_plan_id.clone(),
                master_study_plan_id: plan.master_study_plan_id.clone(),
                chapter_id: entry.chapter_id.clone(),
                topic_id: entry.topic_id.clone(),
                display_order: entry.display_order,
                item: entry.item.clone(),
            };
            records.push(MonitorRecord::learning_item_drift(
                &plan.course_id,
                plan.student_id.as_deref(),
                payload,
                now,
            ));
        }
    }

    records
}
