//! # SPM Common Library
//!
//! Shared code for the study-plan monitor workspace:
//! - Database bootstrap, schema and migrations
//! - Source-of-truth row models (enrollments, study plans, content, items)
//! - Configuration loading
//! - Id and timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
