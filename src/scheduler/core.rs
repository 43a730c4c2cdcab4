//! Scheduler service over tokio-cron-scheduler

use super::error::{SchedulerError, SchedulerResult};
use super::jobs::{Job, JobId, JobMetadata};
use super::metrics;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_cron_scheduler::{JobScheduler, JobSchedulerError};
use tracing::{debug, error, info, warn};

/// Owns the cron scheduler and the jobs registered on it
pub struct SchedulerService {
    enabled: bool,
    scheduler: JobScheduler,
    jobs: Arc<DashMap<JobId, Arc<Job>>>,
    running: Arc<tokio::sync::RwLock<bool>>,
}

impl SchedulerService {
    pub async fn new(enabled: bool) -> SchedulerResult<Self> {
        info!(enabled, "Initializing scheduler service");

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::StartupFailed(e.to_string()))?;

        Ok(Self {
            enabled,
            scheduler,
            jobs: Arc::new(DashMap::new()),
            running: Arc::new(tokio::sync::RwLock::new(false)),
        })
    }

    pub async fn start(&mut self) -> SchedulerResult<()> {
        if !self.enabled {
            info!("Scheduler is disabled in configuration");
            return Ok(());
        }

        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Scheduler is already running");
                return Ok(());
            }
            *running = true;
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::StartupFailed(e.to_string()))?;

        info!(jobs = self.jobs.len(), "Scheduler service started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> SchedulerResult<()> {
        {
            let mut running = self.running.write().await;
            if !*running {
                debug!("Scheduler is not running");
                return Ok(());
            }
            *running = false;
        }

        self.scheduler
            .shutdown()
            .await
            .map_err(|e| SchedulerError::ShutdownFailed(e.to_string()))?;

        info!("Scheduler service shut down");
        Ok(())
    }

    pub async fn add_job(&self, job: Job) -> SchedulerResult<JobId> {
        let metadata = job.get_metadata().await;
        let job_id = metadata.id;
        let job = Arc::new(job);

        let fired = job.clone();
        let cron_job = tokio_cron_scheduler::Job::new_async(metadata.schedule.as_str(), move |_uuid, _l| {
            let job = fired.clone();
            Box::pin(async move {
                let _ = run_job(&job).await;
            })
        })
        .map_err(|e: JobSchedulerError| {
            SchedulerError::InvalidCronExpression(format!("{}: {}", metadata.schedule, e))
        })?;

        self.scheduler
            .add(cron_job)
            .await
            .map_err(|e| SchedulerError::JobCreationFailed(e.to_string()))?;

        self.jobs.insert(job_id, job);
        metrics::update_job_count(self.jobs.len());

        info!(
            job_id = %job_id,
            job_name = %metadata.name,
            schedule = %metadata.schedule,
            "Job added to scheduler"
        );
        Ok(job_id)
    }

    /// Fire a registered job immediately, outside its schedule
    pub async fn run_now(&self, job_id: &JobId) -> SchedulerResult<Result<(), String>> {
        let job = self
            .jobs
            .get(job_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
        Ok(run_job(&job).await)
    }

    pub async fn get_job_metadata(&self, job_id: &JobId) -> SchedulerResult<JobMetadata> {
        let job = self
            .jobs
            .get(job_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
        Ok(job.get_metadata().await)
    }

    pub async fn list_jobs(&self) -> Vec<JobMetadata> {
        let jobs: Vec<Arc<Job>> = self.jobs.iter().map(|entry| entry.value().clone()).collect();
        let mut metadata = Vec::with_capacity(jobs.len());
        for job in jobs {
            metadata.push(job.get_metadata().await);
        }
        metadata.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        metadata
    }
}

async fn run_job(job: &Job) -> Result<(), String> {
    let name = job.get_metadata().await.name;
    debug!(job_name = %name, "Executing scheduled job");

    metrics::record_execution_start(&name);
    let start = std::time::Instant::now();
    let result = job.execute().await;
    let duration = start.elapsed();
    metrics::record_execution_complete(&name, result.is_ok(), duration.as_secs_f64());

    match &result {
        Ok(()) => info!(
            job_name = %name,
            duration_ms = duration.as_millis() as u64,
            "Job executed successfully"
        ),
        Err(e) => error!(
            job_name = %name,
            error = %e,
            duration_ms = duration.as_millis() as u64,
            "Job execution failed"
        ),
    }
    result
}
