//! Error types for spm-monitor
//!
//! Store errors are wrapped with the name of the step that failed so a log
//! line is enough to localize the failure. Alert failures never show up here:
//! they are logged and swallowed at the call site.

use thiserror::Error;

/// Reconciliation error
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A store read or write failed inside the named step
    #[error("{step}: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: spm_common::Error,
    },

    /// Several independent steps failed; every error is kept
    #[error("{} steps failed: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<MonitorError>),

    /// spm-common error without step context
    #[error(transparent)]
    Common(#[from] spm_common::Error),
}

/// Result type for reconciliation operations
pub type MonitorResult<T> = Result<T, MonitorError>;

impl MonitorError {
    /// Merge the outcomes of steps that all had to be attempted
    pub fn combine(results: Vec<MonitorResult<()>>) -> MonitorResult<()> {
        let mut errors: Vec<MonitorError> = results.into_iter().filter_map(Result::err).collect();
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(MonitorError::Multiple(errors)),
        }
    }

    /// Name of the failing step, when there is exactly one
    pub fn step(&self) -> Option<&'static str> {
        match self {
            MonitorError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

fn join_errors(errors: &[MonitorError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Attach a step name to a store result
pub trait StepContext<T> {
    fn step(self, step: &'static str) -> MonitorResult<T>;
}

impl<T> StepContext<T> for spm_common::Result<T> {
    fn step(self, step: &'static str) -> MonitorResult<T> {
        self.map_err(|source| MonitorError::Step { step, source })
    }
}

impl<T> StepContext<T> for Result<T, sqlx::Error> {
    fn step(self, step: &'static str) -> MonitorResult<T> {
        self.map_err(|e| MonitorError::Step {
            step,
            source: spm_common::Error::Database(e),
        })
    }
}
