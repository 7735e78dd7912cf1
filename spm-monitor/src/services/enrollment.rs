//! Enrollment drift: students enrolled in a course without an individual copy
//! of one of the course's master study plans.

use super::StudyPlanMonitorService;
use crate::error::{MonitorResult, StepContext};
use crate::ledger::{MonitorRecord, MonitorType};
use crate::window::IntervalWindow;
use chrono::{DateTime, Utc};
use spm_common::db::{CourseStudent, StudentStudyPlan, StudyPlan};
use spm_common::time;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

impl StudyPlanMonitorService {
    /// Expire enrollment-drift records older than the reverify look-back
    pub(crate) async fn reverify_student_course(&self, interval_minutes: u32) -> MonitorResult<u64> {
        let window = IntervalWindow::reverify(interval_minutes);
        let (older_than, _) = window.bounds(time::now());

        let mut conn = self.pool.acquire().await.step("acquire connection")?;
        let expired = self
            .repos
            .monitors
            .soft_delete_by_type(&mut conn, MonitorType::EnrollmentDrift, older_than)
            .await
            .step("MonitorLedger.soft_delete_by_type")?;

        debug!(expired, window_lower = %window.lower_bound_label(), "Expired enrollment drift records");
        Ok(expired)
    }

    /// Record every (enrollment, master plan) pair in the detection window
    /// that has no individual plan
    pub(crate) async fn collect_missing_student_study_plans(
        &self,
        interval_minutes: u32,
    ) -> MonitorResult<Vec<MonitorRecord>> {
        let window = IntervalWindow::detection(interval_minutes);
        let now = time::now();
        let (from, to) = window.bounds(now);

        let mut conn = self.pool.acquire().await.step("acquire connection")?;

        let enrollments = self
            .repos
            .course_students
            .retrieve_by_interval_time(&mut conn, from, to)
            .await
            .step("CourseStudentRepo.retrieve_by_interval_time")?;
        if enrollments.is_empty() {
            debug!(window = %window, "No enrollment changes in window");
            return Ok(Vec::new());
        }

        let student_ids: Vec<String> = enrollments
            .iter()
            .map(|e| e.student_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let course_ids: Vec<String> = enrollments
            .iter()
            .map(|e| e.course_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let existing = self
            .repos
            .student_study_plans
            .retrieve_by_student_course(&mut conn, &student_ids, &course_ids)
            .await
            .step("StudentStudyPlanRepo.retrieve_by_student_course")?;

        let masters = self
            .repos
            .study_plans
            .retrieve_master_by_course_ids(&mut conn, &course_ids)
            .await
            .step("StudyPlanRepo.retrieve_master_by_course_ids")?;

        let records = missing_enrollment_plans(&enrollments, &existing, &masters, now);
        if records.is_empty() {
            return Ok(records);
        }

        self.repos
            .monitors
            .bulk_upsert(&mut conn, &records)
            .await
            .step("MonitorLedger.bulk_upsert")?;
        drop(conn);

        info!(count = records.len(), "Recorded enrollment drift");
        self.send_alert(records.len(), MonitorType::EnrollmentDrift, None)
            .await;

        Ok(records)
    }
}

/// One enrollment-drift record per enrollment and master plan of its course
/// with no individual plan for that student
pub fn missing_enrollment_plans(
    enrollments: &[CourseStudent],
    existing: &[StudentStudyPlan],
    masters: &[StudyPlan],
    now: DateTime<Utc>,
) -> Vec<MonitorRecord> {
    let mut masters_by_course: HashMap<&str, Vec<&StudyPlan>> = HashMap::new();
    for master in masters {
        masters_by_course
            .entry(master.course_id.as_str())
            .or_default()
            .push(master);
    }

    let tracked: HashSet<(&str, &str)> = existing
        .iter()
        .filter_map(|p| {
            p.master_study_plan_id
                .as_deref()
                .map(|master_id| (p.student_id.as_str(), master_id))
        })
        .collect();

    let mut records = Vec::new();
    for enrollment in enrollments {
        let Some(course_masters) = masters_by_course.get(enrollment.course_id.as_str()) else {
            continue;
        };
        for master in course_masters {
            if tracked.contains(&(enrollment.student_id.as_str(), master.study_plan_id.as_str())) {
                continue;
            }
            records.push(MonitorRecord::enrollment_drift(
                &enrollment.course_id,
                &enrollment.student_id,
                &master.study_plan_id,
                now,
            ));
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MonitorPayload;

    fn enrollment(course: &str, student: &str) -> CourseStudent {
        let now = time::now();
        CourseStudent {
            course_id: course.to_string(),
            student_id: student.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn master(id: &str, course: &str) -> StudyPlan {
        StudyPlan {
            study_plan_id: id.to_string(),
            master_study_plan_id: None,
            course_id: course.to_string(),
            book_id: Some("book-1".to_string()),
            study_plan_type: "STUDY_PLAN_TYPE_COURSE".to_string(),
        }
    }

    fn individual(student: &str, master_id: &str) -> StudentStudyPlan {
        StudentStudyPlan {
            study_plan_id: format!("{}-{}", student, master_id),
            student_id: student.to_string(),
            master_study_plan_id: Some(master_id.to_string()),
        }
    }

    fn pairs(records: &[MonitorRecord]) -> HashSet<(String, String, String)> {
        records
            .iter()
            .map(|r| match &r.payload {
                MonitorPayload::EnrollmentDrift(p) => (
                    p.course_id.clone(),
                    p.student_id.clone(),
                    p.master_study_plan_id.clone(),
                ),
                other => panic!("unexpected payload {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_every_untracked_master_is_reported() {
        let enrollments = vec![enrollment("course-1", "student-1")];
        let masters = vec![master("msp-a", "course-1"), master("msp-b", "course-1")];
        let existing = vec![individual("student-1", "msp-a")];

        let records = missing_enrollment_plans(&enrollments, &existing, &masters, time::now());
        let expected: HashSet<_> = [("course-1".to_string(), "student-1".to_string(), "msp-b".to_string())]
            .into_iter()
            .collect();
        assert_eq!(pairs(&records), expected);
    }

    #[test]
    fn test_course_without_master_yields_nothing() {
        let enrollments = vec![enrollment("course-9", "student-1")];
        let masters = vec![master("msp-a", "course-1")];
        assert!(missing_enrollment_plans(&enrollments, &[], &masters, time::now()).is_empty());
    }

    #[test]
    fn test_individual_plan_of_other_student_does_not_count() {
        let enrollments = vec![enrollment("course-1", "student-2")];
        let masters = vec![master("msp-a", "course-1")];
        let existing = vec![individual("student-1", "msp-a")];

        let records = missing_enrollment_plans(&enrollments, &existing, &masters, time::now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_id.as_deref(), Some("student-2"));
        assert_eq!(records[0].course_id, "course-1");
    }
}
