//! Content-structure keys
//!
//! A study-plan item is identified inside its plan by the flattened locator of
//! the learning item it binds:
//!
//! ```text
//! book::<book>topic::<topic>chapter::<chapter>course::<course>lo::<lo>
//! book::<book>topic::<topic>chapter::<chapter>course::<course>assignment::<assignment>
//! ```
//!
//! The flattened string is stored in `study_plan_items.content_structure_flatten`
//! and is unique per plan, which makes remediation idempotent.

use crate::ledger::{LearningItem, LearningItemDriftPayload};
use spm_common::db::ContentStructure;
use std::fmt;

/// Flattened content-structure locator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentStructureKey(String);

impl ContentStructureKey {
    pub fn new(cs: &ContentStructure, item: &LearningItem) -> Self {
        let prefix = format!(
            "book::{}topic::{}chapter::{}course::{}",
            cs.book_id, cs.topic_id, cs.chapter_id, cs.course_id
        );
        let flattened = match item {
            LearningItem::LearningObjective(lo_id) => format!("{}lo::{}", prefix, lo_id),
            LearningItem::Assignment(assignment_id) => {
                format!("{}assignment::{}", prefix, assignment_id)
            }
        };
        Self(flattened)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentStructureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuild the full locator of a drift payload without touching the catalog
pub fn content_structure_of(course_id: &str, payload: &LearningItemDriftPayload) -> ContentStructure {
    let (lo_id, assignment_id) = match &payload.item {
        LearningItem::LearningObjective(id) => (Some(id.clone()), None),
        LearningItem::Assignment(id) => (None, Some(id.clone())),
    };

    ContentStructure {
        course_id: course_id.to_string(),
        book_id: payload.book_id.clone(),
        chapter_id: payload.chapter_id.clone(),
        topic_id: payload.topic_id.clone(),
        lo_id,
        assignment_id,
    }
}

/// Dedup key of one synthesized row: the target plan plus the locator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanContentKey {
    pub study_plan_id: String,
    pub content: ContentStructureKey,
}
