//! Poll loops driving the two reconciliation entry points
//!
//! Each entry point gets its own `tokio::time::interval`. Missed ticks are
//! skipped, so a slow pass delays the next one instead of stacking up behind
//! it. Failures are logged; the next tick is the retry.

use crate::error::{MonitorError, MonitorResult};
use crate::services::StudyPlanMonitorService;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

pub struct Scheduler {
    service: Arc<StudyPlanMonitorService>,
    student_course_interval_minutes: u32,
    learning_item_interval_minutes: u32,
    organization_id: String,
}

impl Scheduler {
    /// Cadences and organization come from the service's configuration
    pub fn new(service: Arc<StudyPlanMonitorService>) -> Self {
        let config = service.config();
        Self {
            student_course_interval_minutes: config.student_course_interval_minutes,
            learning_item_interval_minutes: config.learning_item_interval_minutes,
            organization_id: config.organization_id.clone(),
            service,
        }
    }

    /// One pass of both entry points; both run even if the first fails
    pub async fn run_once(&self) -> MonitorResult<()> {
        let student_course = self
            .service
            .upsert_student_course(self.student_course_interval_minutes)
            .await;
        let learning_items = self
            .service
            .upsert_learning_items(self.learning_item_interval_minutes, &self.organization_id)
            .await;

        MonitorError::combine(vec![student_course, learning_items])
    }

    /// Poll until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);

        let student_course = {
            let service = Arc::clone(&self.service);
            let minutes = self.student_course_interval_minutes;
            spawn_loop("student_course", minutes, stop_rx.clone(), move || {
                let service = Arc::clone(&service);
                async move { service.upsert_student_course(minutes).await }
            })
        };

        let learning_items = {
            let service = Arc::clone(&self.service);
            let minutes = self.learning_item_interval_minutes;
            let org_id = self.organization_id.clone();
            spawn_loop("learning_items", minutes, stop_rx, move || {
                let service = Arc::clone(&service);
                let org_id = org_id.clone();
                async move { service.upsert_learning_items(minutes, &org_id).await }
            })
        };

        shutdown.await;
        info!("Shutdown requested, stopping poll loops");
        let _ = stop_tx.send(true);

        for handle in [student_course, learning_items] {
            if let Err(e) = handle.await {
                error!(error = %e, "Poll loop panicked");
            }
        }
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    interval_minutes: u32,
    mut stop: watch::Receiver<bool>,
    mut pass: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = MonitorResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let period = Duration::from_secs(u64::from(interval_minutes.max(1)) * 60);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(name, interval_minutes, "Poll loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = pass().await {
                        error!(name, step = e.step(), error = %e, "Reconciliation pass failed");
                    }
                }
                _ = stop.changed() => break,
            }
        }

        info!(name, "Poll loop stopped");
    })
}
