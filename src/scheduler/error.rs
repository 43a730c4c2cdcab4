//! Error types for the scheduler module

use crate::error::AppError;

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Failed to start scheduler: {0}")]
    StartupFailed(String),

    #[error("Failed to shutdown scheduler: {0}")]
    ShutdownFailed(String),

    #[error("Failed to create job: {0}")]
    JobCreationFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCronExpression(String),
}

impl From<SchedulerError> for AppError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobNotFound(msg) => AppError::NotFound(msg),
            SchedulerError::InvalidCronExpression(msg) => AppError::Configuration(msg),
            _ => AppError::Scheduler(err.to_string()),
        }
    }
}
