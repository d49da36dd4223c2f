pub mod backfills;
pub mod clusters;
pub mod health;
pub mod runs;
pub mod sync;
pub mod workflows;
