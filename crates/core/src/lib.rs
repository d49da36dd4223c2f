//! Shared primitives for all Rust crates in Orbit.

#![forbid(unsafe_code)]

/// Clock abstraction shared by services and test doubles.
pub mod clock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};

/// Result type used across Orbit crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A run or backfill state change violates its state machine.
    #[error("invalid transition: cannot {operation} {resource} in state {current_state}")]
    InvalidTransition {
        /// Kind of resource the transition was attempted on.
        resource: &'static str,
        /// State the resource was in when the transition was attempted.
        current_state: String,
        /// Attempted operation.
        operation: &'static str,
    },

    /// A workflow lifecycle change violates the workflow invariants.
    #[error("invalid workflow transition: cannot {operation} workflow in status {current_status}")]
    InvalidWorkflowTransition {
        /// Workflow status when the change was attempted.
        current_status: String,
        /// Attempted operation.
        operation: &'static str,
    },

    /// One orchestrator cluster could not be reached or answered with an error.
    #[error("cluster '{cluster_id}' unreachable: {reason}")]
    ClusterUnreachable {
        /// Cluster that failed.
        cluster_id: String,
        /// Transport or protocol failure detail.
        reason: String,
    },

    /// Routing found no active cluster at all.
    #[error("no active cluster available for team '{team}'")]
    NoClusterAvailable {
        /// Team the routing was attempted for.
        team: String,
    },

    /// Referenced run does not exist locally.
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// Referenced backfill does not exist locally.
    #[error("backfill not found: {0}")]
    BackfillNotFound(String),

    /// External status string is not part of the state mapping table.
    #[error("unmappable external state '{0}'")]
    UnmappableExternalState(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the error is a not-found condition of any kind.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::RunNotFound(_) | Self::BackfillNotFound(_)
        )
    }
}
