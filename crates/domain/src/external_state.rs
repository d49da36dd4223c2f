//! Mapping from orchestrator state strings to local run states.

use orbit_core::{AppError, AppResult};

use crate::run::RunStatus;

/// Maps one external state string through the fixed mapping table.
///
/// Matching ignores ASCII case and treats `-`, `_` and spaces alike, so
/// `up_for_retry`, `UP-FOR-RETRY` and `retry pending` style values resolve the
/// same way. Unknown values fail with [`AppError::UnmappableExternalState`].
pub fn map_external_state(raw: &str) -> AppResult<RunStatus> {
    let normalized: String = raw
        .trim()
        .chars()
        .map(|character| match character {
            '-' | ' ' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect();

    let status = match normalized.as_str() {
        "queued" | "scheduled" | "none" | "pending" => RunStatus::Pending,
        "running" | "retry_pending" | "up_for_retry" | "up_for_reschedule" | "restarting"
        | "deferred" => RunStatus::Running,
        "success" | "succeeded" => RunStatus::Success,
        "failed" | "upstream_failed" => RunStatus::Failed,
        "skipped" => RunStatus::Skipped,
        _ => return Err(AppError::UnmappableExternalState(raw.to_owned())),
    };

    Ok(status)
}

/// Maps one external state string, degrading unknown values to UNKNOWN.
#[must_use]
pub fn map_external_state_lossy(raw: &str) -> RunStatus {
    map_external_state(raw).unwrap_or(RunStatus::Unknown)
}
