//! Test Helper Utilities
//!
//! Shared utilities for testing spm-monitor

#![allow(dead_code)]

pub mod alert_sinks;
pub mod db_utils;

pub use alert_sinks::{FailingAlertSink, RecordingAlertSink};
pub use db_utils::*;
