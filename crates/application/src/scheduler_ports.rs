mod definitions;
mod lease;
mod port;
mod records;

pub use definitions::{CodeDefinition, DefinitionListing, WorkflowDefinitionSource};
pub use lease::{SyncLease, SyncLeaseCoordinator};
pub use port::{ExternalSchedulerPort, SchedulerClientProvider};
pub use records::{
    BackfillRequest, ExternalBackfill, ExternalRunRecord, ExternalTaskInstance, ScheduleRequest,
    TriggerRunRequest, TriggeredRun,
};
