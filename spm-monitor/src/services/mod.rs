//! Study-plan reconciliation service
//!
//! Two entry points, each driven by the scheduler on its own cadence:
//!
//! - [`StudyPlanMonitorService::upsert_student_course`]: enrollment drift.
//!   Detection and reverify run concurrently; both are always attempted and
//!   their errors are combined.
//! - [`StudyPlanMonitorService::upsert_learning_items`]: learning-item drift.
//!   Detection commits first, then remediation runs in its own transaction
//!   over the records detection just wrote.

mod enrollment;
mod learning_items;
mod remediation;

pub use enrollment::missing_enrollment_plans;
pub use learning_items::{missing_learning_items, BookCatalog, CatalogEntry};
pub use remediation::RemediationOutcome;

use crate::alert::{AlertPayload, AlertSink};
use crate::error::{MonitorError, MonitorResult};
use crate::ledger::MonitorType;
use crate::repositories::Repositories;
use spm_common::config::MonitorConfig;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

pub struct StudyPlanMonitorService {
    pool: SqlitePool,
    config: Arc<MonitorConfig>,
    alert: Arc<dyn AlertSink>,
    repos: Repositories,
    /// Serializes learning-item passes per organization within this process
    org_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StudyPlanMonitorService {
    pub fn new(pool: SqlitePool, config: MonitorConfig, alert: Arc<dyn AlertSink>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            alert,
            repos: Repositories::sqlite(),
            org_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the store collaborators
    pub fn with_repositories(mut self, repos: Repositories) -> Self {
        self.repos = repos;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Detect enrollments missing an individual study plan, and expire old
    /// enrollment-drift alarms
    #[instrument(skip(self))]
    pub async fn upsert_student_course(&self, interval_minutes: u32) -> MonitorResult<()> {
        let (reverify, collect) = tokio::join!(
            self.reverify_student_course(interval_minutes),
            self.collect_missing_student_study_plans(interval_minutes),
        );

        if let Ok(expired) = &reverify {
            info!(expired, "Reverify pass finished");
        }
        if let Ok(records) = &collect {
            info!(count = records.len(), "Enrollment drift pass finished");
        }

        MonitorError::combine(vec![reverify.map(|_| ()), collect.map(|_| ())])
    }

    /// Detect study plans missing learning items, then synthesize the items
    #[instrument(skip(self))]
    pub async fn upsert_learning_items(&self, interval_minutes: u32, org_id: &str) -> MonitorResult<()> {
        let lock = self.org_lock(org_id).await;
        let _guard = lock.lock().await;

        let records = self.collect_missing_learning_items(interval_minutes).await?;
        if records.is_empty() {
            info!("No learning item drift");
            return Ok(());
        }

        self.send_alert(records.len(), MonitorType::LearningItemDrift, Some(org_id))
            .await;

        let outcome = self.auto_upsert_study_plan_items(&records).await?;
        info!(
            detected = records.len(),
            items_written = outcome.items_written,
            join_rows_written = outcome.join_rows_written,
            resolved = outcome.resolved,
            "Learning item pass finished"
        );
        Ok(())
    }

    async fn org_lock(&self, org_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.org_locks.lock().await;
        locks
            .entry(org_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Best-effort notification: failures are logged, never returned
    async fn send_alert(&self, count: usize, monitor_type: MonitorType, org_id: Option<&str>) {
        let org_id = org_id.or(Some(self.config.organization_id.as_str()));
        let payload = AlertPayload::missing_items(
            &self.config.school_name,
            &self.config.environment,
            org_id,
            count,
            monitor_type,
        );

        if let Err(e) = self.alert.send(&payload).await {
            error!(error = %e, count, monitor_type = %monitor_type, "Failed to send alert");
        }
    }
}
