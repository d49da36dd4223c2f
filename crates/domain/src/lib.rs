//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod backfill;
mod cluster;
mod external_state;
mod run;
mod workflow;

pub use backfill::{
    Backfill, BackfillId, BackfillSnapshot, BackfillState, DateRange, ExternalBackfillStatus,
};
pub use cluster::{Cluster, ClusterId, ExternalRunId, ExternalRunKey, team_from_identifier};
pub use external_state::{map_external_state, map_external_state_lossy};
pub use run::{
    ExternalRunObservation, NewRun, Run, RunCounters, RunId, RunSnapshot, RunStatus, RunType,
    StopMetadata, SyncOutcome,
};
pub use workflow::{
    DatasetName, ScheduleDescriptor, Workflow, WorkflowRegistration, WorkflowSourceType,
    WorkflowStatus,
};
