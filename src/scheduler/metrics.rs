//! Recording helpers over the scheduler series in [`crate::metrics`]

use crate::metrics::{
    SCHEDULER_EXECUTIONS_TOTAL, SCHEDULER_EXECUTION_DURATION_SECONDS, SCHEDULER_JOBS,
    SCHEDULER_LAST_EXECUTION_TIMESTAMP, SCHEDULER_RUNNING_JOBS,
};

pub(crate) fn record_execution_start(job_name: &str) {
    SCHEDULER_RUNNING_JOBS.with_label_values(&[job_name]).inc();
}

pub(crate) fn record_execution_complete(job_name: &str, success: bool, duration_secs: f64) {
    SCHEDULER_RUNNING_JOBS.with_label_values(&[job_name]).dec();

    let status = if success { "success" } else { "failure" };
    SCHEDULER_EXECUTIONS_TOTAL
        .with_label_values(&[job_name, status])
        .inc();
    SCHEDULER_EXECUTION_DURATION_SECONDS
        .with_label_values(&[job_name])
        .observe(duration_secs);
    SCHEDULER_LAST_EXECUTION_TIMESTAMP
        .with_label_values(&[job_name])
        .set(chrono::Utc::now().timestamp() as f64);
}

pub(crate) fn update_job_count(count: usize) {
    SCHEDULER_JOBS.set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_is_counted() {
        record_execution_start("metrics_test_job");
        record_execution_complete("metrics_test_job", false, 0.2);

        assert_eq!(
            SCHEDULER_EXECUTIONS_TOTAL
                .with_label_values(&["metrics_test_job", "failure"])
                .get(),
            1.0
        );
        assert_eq!(
            SCHEDULER_RUNNING_JOBS
                .with_label_values(&["metrics_test_job"])
                .get(),
            0.0
        );
    }
}
