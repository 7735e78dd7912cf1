//! Auto-remediation of learning-item drift
//!
//! Master-plan rows are written before individual rows so an individual item
//! can point at the master item it copies. Candidate rows are collapsed by
//! (plan, content key) first; the store's unique index on the same pair makes
//! a rerun, or a concurrent run in another process, write nothing twice.

use super::StudyPlanMonitorService;
use crate::content_structure::{content_structure_of, ContentStructureKey, PlanContentKey};
use crate::error::{MonitorResult, StepContext};
use crate::ledger::{LearningItem, LearningItemDriftPayload, MonitorPayload, MonitorRecord};
use crate::utils::begin_monitored;
use chrono::{DateTime, Utc};
use spm_common::db::{AssignmentStudyPlanItem, LoStudyPlanItem, StudyPlanItem, STUDY_PLAN_ITEM_STATUS_ACTIVE};
use spm_common::{time, uuid_utils};
use sqlx::types::Json;
use std::collections::HashSet;
use tracing::debug;

/// Counts from one remediation transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemediationOutcome {
    /// Study-plan items inserted
    pub items_written: usize,
    /// Learning-objective and assignment join rows inserted
    pub join_rows_written: u64,
    /// Monitor records stamped auto-resolved
    pub resolved: u64,
}

/// A candidate item plus the learning item it binds
struct Candidate<'a> {
    record_id: &'a str,
    payload: &'a LearningItemDriftPayload,
    item: StudyPlanItem,
}

/// Collapses candidates by (plan, content key); first record wins
#[derive(Default)]
struct Dedup<'a> {
    seen: HashSet<PlanContentKey>,
    resolved_ids: Vec<&'a str>,
}

impl<'a> Dedup<'a> {
    fn admit(&mut self, record: &'a MonitorRecord, payload: &LearningItemDriftPayload, key: &ContentStructureKey) -> bool {
        let plan_key = PlanContentKey {
            study_plan_id: payload.study_plan_id.clone(),
            content: key.clone(),
        };
        if !self.seen.insert(plan_key) {
            return false;
        }
        self.resolved_ids.push(&record.id);
        true
    }
}

fn new_item(
    record: &MonitorRecord,
    payload: &LearningItemDriftPayload,
    key: ContentStructureKey,
    now: DateTime<Utc>,
) -> StudyPlanItem {
    StudyPlanItem {
        study_plan_item_id: uuid_utils::generate_id(),
        study_plan_id: payload.study_plan_id.clone(),
        copy_study_plan_item_id: None,
        content_structure: Json(content_structure_of(&record.course_id, payload)),
        content_structure_flatten: key.into_string(),
        display_order: payload.display_order,
        status: STUDY_PLAN_ITEM_STATUS_ACTIVE.to_string(),
        school_date: None,
        created_at: now,
        updated_at: now,
    }
}

impl StudyPlanMonitorService {
    /// Synthesize the items `records` report missing and mark them resolved
    pub(crate) async fn auto_upsert_study_plan_items(
        &self,
        records: &[MonitorRecord],
    ) -> MonitorResult<RemediationOutcome> {
        let now = time::now();

        let drifts: Vec<(&MonitorRecord, &LearningItemDriftPayload)> = records
            .iter()
            .filter_map(|r| match &r.payload {
                MonitorPayload::LearningItemDrift(p) => Some((r, p)),
                MonitorPayload::EnrollmentDrift(_) => None,
            })
            .collect();
        if drifts.is_empty() {
            return Ok(RemediationOutcome::default());
        }

        let mut tx = begin_monitored(&self.pool, "learning_items::remediate")
            .await
            .step("begin remediation transaction")?;
        let mut dedup = Dedup::default();

        // Master plans first
        let mut masters: Vec<Candidate> = Vec::new();
        for &(record, payload) in drifts.iter().filter(|(r, _)| r.student_id.is_none()) {
            let cs = content_structure_of(&record.course_id, payload);
            let key = ContentStructureKey::new(&cs, &payload.item);
            if dedup.admit(record, payload, &key) {
                masters.push(Candidate {
                    record_id: &record.id,
                    payload,
                    item: new_item(record, payload, key, now),
                });
            }
        }

        let master_items: Vec<StudyPlanItem> = masters.iter().map(|c| c.item.clone()).collect();
        let mut inserted: HashSet<String> = self
            .repos
            .study_plan_items
            .bulk_sync(tx.conn(), &master_items)
            .await
            .step("StudyPlanItemRepo.bulk_sync master")?
            .into_iter()
            .collect();

        // Individual plans, copying scheduling from the master item
        let mut individuals: Vec<Candidate> = Vec::new();
        for &(record, payload) in drifts.iter().filter(|(r, _)| r.student_id.is_some()) {
            let cs = content_structure_of(&record.course_id, payload);
            let key = ContentStructureKey::new(&cs, &payload.item);
            if !dedup.admit(record, payload, &key) {
                continue;
            }

            let master_item = match &payload.master_study_plan_id {
                Some(master_id) => self
                    .repos
                    .study_plan_items
                    .find_master_item(tx.conn(), master_id, key.as_str())
                    .await
                    .step("StudyPlanItemRepo.find_master_item")?,
                None => None,
            };

            let mut item = new_item(record, payload, key, now);
            if let Some(master_item) = master_item {
                item.copy_study_plan_item_id = Some(master_item.study_plan_item_id);
                item.school_date = master_item.school_date;
            }
            individuals.push(Candidate {
                record_id: &record.id,
                payload,
                item,
            });
        }

        let individual_items: Vec<StudyPlanItem> = individuals.iter().map(|c| c.item.clone()).collect();
        inserted.extend(
            self.repos
                .study_plan_items
                .bulk_sync(tx.conn(), &individual_items)
                .await
                .step("StudyPlanItemRepo.bulk_sync individual")?,
        );

        // Join rows only for items that were actually created
        let mut lo_rows = Vec::new();
        let mut assignment_rows = Vec::new();
        for candidate in masters.iter().chain(individuals.iter()) {
            if !inserted.contains(&candidate.item.study_plan_item_id) {
                debug!(
                    monitor_id = candidate.record_id,
                    study_plan_id = %candidate.payload.study_plan_id,
                    "Item already present, no join row"
                );
                continue;
            }
            let study_plan_item_id = candidate.item.study_plan_item_id.clone();
            match &candidate.payload.item {
                LearningItem::LearningObjective(lo_id) => lo_rows.push(LoStudyPlanItem {
                    lo_id: lo_id.clone(),
                    study_plan_item_id,
                    created_at: now,
                    updated_at: now,
                }),
                LearningItem::Assignment(assignment_id) => assignment_rows.push(AssignmentStudyPlanItem {
                    assignment_id: assignment_id.clone(),
                    study_plan_item_id,
                    created_at: now,
                    updated_at: now,
                }),
            }
        }

        let mut join_rows_written = self
            .repos
            .lo_study_plan_items
            .bulk_insert(tx.conn(), &lo_rows)
            .await
            .step("LoStudyPlanItemRepo.bulk_insert")?;
        join_rows_written += self
            .repos
            .assignment_study_plan_items
            .bulk_insert(tx.conn(), &assignment_rows)
            .await
            .step("AssignmentStudyPlanItemRepo.bulk_insert")?;

        let resolved_ids: Vec<String> = dedup.resolved_ids.iter().map(|id| id.to_string()).collect();
        let resolved = self
            .repos
            .monitors
            .mark_auto_resolved(tx.conn(), &resolved_ids)
            .await
            .step("MonitorLedger.mark_auto_resolved")?;

        tx.commit().await.step("commit remediation transaction")?;

        Ok(RemediationOutcome {
            items_written: inserted.len(),
            join_rows_written,
            resolved,
        })
    }
}
