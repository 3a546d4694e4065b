//! Scheduling infrastructure for the periodic sync loop
//!
//! The scheduler follows explicit lifecycle rules: start/stop methods, a
//! tracked join handle, and cancellation through a token.

pub mod error;
pub mod sync_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use sync_scheduler::{SyncJob, SyncScheduler, SyncSchedulerConfig};
