//! Job definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type JobId = Uuid;

type JobFn =
    dyn Fn(JobContext) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
}

/// Bookkeeping for one registered job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub id: JobId,
    pub name: String,
    pub description: Option<String>,
    /// Six-field cron expression (seconds first)
    pub schedule: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_duration_ms: f64,
}

impl JobMetadata {
    pub fn new(name: impl Into<String>, schedule: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            schedule: schedule.into(),
            status: JobStatus::Scheduled,
            created_at: now,
            updated_at: now,
            last_run: None,
            last_error: None,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            avg_duration_ms: 0.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn update_execution(&mut self, outcome: &Result<(), String>, duration_ms: u64) {
        self.run_count += 1;
        match outcome {
            Ok(()) => {
                self.success_count += 1;
                self.status = JobStatus::Completed;
                self.last_error = None;
            }
            Err(e) => {
                self.failure_count += 1;
                self.status = JobStatus::Failed;
                self.last_error = Some(e.clone());
            }
        }

        // Incremental mean
        self.avg_duration_ms = ((self.avg_duration_ms * (self.run_count - 1) as f64)
            + duration_ms as f64)
            / self.run_count as f64;

        let now = Utc::now();
        self.last_run = Some(now);
        self.updated_at = now;
    }

    pub fn success_rate(&self) -> f64 {
        if self.run_count == 0 {
            0.0
        } else {
            (self.success_count as f64 / self.run_count as f64) * 100.0
        }
    }
}

/// Handed to a job body on each firing
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub job_name: String,
    pub fired_at: DateTime<Utc>,
}

impl JobContext {
    pub fn new(metadata: &JobMetadata) -> Self {
        Self {
            job_id: metadata.id,
            job_name: metadata.name.clone(),
            fired_at: Utc::now(),
        }
    }
}

pub struct Job {
    metadata: Arc<RwLock<JobMetadata>>,
    execute: Arc<JobFn>,
}

impl Job {
    pub fn new<F, Fut>(metadata: JobMetadata, execute: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            metadata: Arc::new(RwLock::new(metadata)),
            execute: Arc::new(move |ctx| Box::pin(execute(ctx))),
        }
    }

    pub async fn get_metadata(&self) -> JobMetadata {
        self.metadata.read().await.clone()
    }

    /// Run the body once and fold the outcome into the metadata
    pub async fn execute(&self) -> Result<(), String> {
        let ctx = {
            let mut metadata = self.metadata.write().await;
            metadata.status = JobStatus::Running;
            metadata.updated_at = Utc::now();
            JobContext::new(&metadata)
        };

        let start = std::time::Instant::now();
        let result = (self.execute)(ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.metadata
            .write()
            .await
            .update_execution(&result, duration_ms);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_tracks_outcomes() {
        let job = Job::new(JobMetadata::new("flaky", "0 * * * * *"), |ctx| async move {
            if ctx.job_name == "flaky" {
                Err("no luck".to_string())
            } else {
                Ok(())
            }
        });

        assert!(job.execute().await.is_err());
        let metadata = job.get_metadata().await;
        assert_eq!(metadata.status, JobStatus::Failed);
        assert_eq!(metadata.failure_count, 1);
        assert_eq!(metadata.last_error.as_deref(), Some("no luck"));
        assert_eq!(metadata.success_rate(), 0.0);
    }

    #[test]
    fn test_average_duration() {
        let mut metadata = JobMetadata::new("job", "0 * * * * *");
        metadata.update_execution(&Ok(()), 100);
        metadata.update_execution(&Ok(()), 300);
        assert_eq!(metadata.avg_duration_ms, 200.0);
        assert_eq!(metadata.success_rate(), 100.0);
    }
}
