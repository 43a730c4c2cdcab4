//! Scheduled job execution using tokio-cron-scheduler
//!
//! The corpus sync pass runs here on the configured cron schedule. Job
//! execution counts and durations are exported through [`crate::metrics`].
//!
//! ```no_run
//! # use incident_kb_mcp::scheduler::{kb_sync_job, SchedulerService};
//! # async fn example(pipeline: incident_kb_mcp::sync::SyncPipeline) -> Result<(), Box<dyn std::error::Error>> {
//! let mut scheduler = SchedulerService::new(true).await?;
//! scheduler.add_job(kb_sync_job(pipeline, "0 0 * * * *")).await?;
//! scheduler.start().await?;
//! # Ok(())
//! # }
//! ```

mod core;
mod error;
mod jobs;
mod metrics;
mod tasks;

pub use self::core::SchedulerService;
pub use error::{SchedulerError, SchedulerResult};
pub use jobs::{Job, JobContext, JobId, JobMetadata, JobStatus};
pub use tasks::{kb_sync_job, run_kb_sync, KB_SYNC_JOB};
