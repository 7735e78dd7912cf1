//! spm-monitor: study-plan consistency reconciler
//!
//! Detects drift between course enrollment / course content and the study
//! plans derived from them, records each gap in the monitor ledger, alerts,
//! and synthesizes missing study-plan items.

pub mod alert;
pub mod content_structure;
pub mod error;
pub mod ledger;
pub mod repositories;
pub mod scheduler;
pub mod services;
pub mod utils;
pub mod window;

pub use crate::error::{MonitorError, MonitorResult};
pub use crate::services::StudyPlanMonitorService;
