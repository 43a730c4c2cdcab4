/// Prometheus metrics for the incident knowledge-base service.
///
/// Covers the HTTP surface, protocol dispatch, capability execution,
/// lifecycle transitions, corpus sync passes, scheduled jobs and outbound
/// integrations.
///
/// # Example
/// ```no_run
/// use incident_kb_mcp::metrics::CAPABILITY_CALLS_TOTAL;
///
/// CAPABILITY_CALLS_TOTAL
///     .with_label_values(&["get_incident", "success"])
///     .inc();
/// ```

mod middleware;

pub use middleware::track_http_metrics;

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
};

const NAMESPACE: &str = "incident_kb_mcp";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    // ============================================================================
    // Protocol Metrics
    // ============================================================================

    /// Labels: method, outcome (ok | error code name)
    pub static ref PROTOCOL_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("protocol_requests_total", "Total number of protocol requests dispatched")
            .namespace(NAMESPACE),
        &["method", "outcome"]
    ).expect("Failed to create PROTOCOL_REQUESTS_TOTAL metric");

    /// Labels: tool, status
    pub static ref CAPABILITY_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("capability_calls_total", "Total number of capability invocations")
            .namespace(NAMESPACE),
        &["tool", "status"]
    ).expect("Failed to create CAPABILITY_CALLS_TOTAL metric");

    /// Labels: tool
    pub static ref CAPABILITY_CALL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "capability_call_duration_seconds",
            "Capability execution duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["tool"]
    ).expect("Failed to create CAPABILITY_CALL_DURATION_SECONDS metric");

    // ============================================================================
    // Lifecycle Metrics
    // ============================================================================

    /// Labels: status (target status of the transition)
    pub static ref LIFECYCLE_TRANSITIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("lifecycle_transitions_total", "Total number of incident status transitions")
            .namespace(NAMESPACE),
        &["status"]
    ).expect("Failed to create LIFECYCLE_TRANSITIONS_TOTAL metric");

    // ============================================================================
    // Sync Metrics
    // ============================================================================

    /// Per-pass record counts of the most recent sync pass
    ///
    /// Labels: namespace, metric (IncidentsFound | IncidentsSynced | SyncErrors | IncidentsSkipped)
    pub static ref SYNC_LAST_PASS_RECORDS: GaugeVec = GaugeVec::new(
        Opts::new("sync_last_pass_records", "Record counts of the most recent sync pass")
            .namespace(NAMESPACE),
        &["namespace", "metric"]
    ).expect("Failed to create SYNC_LAST_PASS_RECORDS metric");

    /// Labels: namespace
    pub static ref SYNC_LAST_PASS_DURATION_MS: GaugeVec = GaugeVec::new(
        Opts::new("sync_last_pass_duration_ms", "Duration of the most recent sync pass in milliseconds")
            .namespace(NAMESPACE),
        &["namespace"]
    ).expect("Failed to create SYNC_LAST_PASS_DURATION_MS metric");

    /// Labels: result (completed | aborted)
    pub static ref SYNC_PASSES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("sync_passes_total", "Total number of sync passes run")
            .namespace(NAMESPACE),
        &["result"]
    ).expect("Failed to create SYNC_PASSES_TOTAL metric");

    // ============================================================================
    // Integration Metrics
    // ============================================================================

    /// Labels: integration, status
    pub static ref INTEGRATION_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("integration_requests_total", "Total number of outbound integration requests")
            .namespace(NAMESPACE),
        &["integration", "status"]
    ).expect("Failed to create INTEGRATION_REQUESTS_TOTAL metric");

    /// Labels: integration
    pub static ref INTEGRATION_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "integration_request_duration_seconds",
            "Outbound integration request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["integration"]
    ).expect("Failed to create INTEGRATION_REQUEST_DURATION_SECONDS metric");

    // ============================================================================
    // Scheduler Metrics
    // ============================================================================

    pub static ref SCHEDULER_JOBS: Gauge = Gauge::with_opts(
        Opts::new("scheduler_jobs", "Number of registered scheduled jobs")
            .namespace(NAMESPACE)
    ).expect("Failed to create SCHEDULER_JOBS metric");

    /// Labels: job
    pub static ref SCHEDULER_RUNNING_JOBS: GaugeVec = GaugeVec::new(
        Opts::new("scheduler_running_jobs", "Number of job executions in flight")
            .namespace(NAMESPACE),
        &["job"]
    ).expect("Failed to create SCHEDULER_RUNNING_JOBS metric");

    /// Labels: job, status (success | failure)
    pub static ref SCHEDULER_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("scheduler_executions_total", "Total number of scheduled job executions")
            .namespace(NAMESPACE),
        &["job", "status"]
    ).expect("Failed to create SCHEDULER_EXECUTIONS_TOTAL metric");

    /// Labels: job
    pub static ref SCHEDULER_EXECUTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "scheduler_execution_duration_seconds",
            "Scheduled job execution duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["job"]
    ).expect("Failed to create SCHEDULER_EXECUTION_DURATION_SECONDS metric");

    /// Labels: job
    pub static ref SCHEDULER_LAST_EXECUTION_TIMESTAMP: GaugeVec = GaugeVec::new(
        Opts::new("scheduler_last_execution_timestamp", "Unix timestamp of the last job execution")
            .namespace(NAMESPACE),
        &["job"]
    ).expect("Failed to create SCHEDULER_LAST_EXECUTION_TIMESTAMP metric");

    // ============================================================================
    // Error & System Metrics
    // ============================================================================

    /// Labels: component, error_type
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("errors_total", "Total number of errors")
            .namespace(NAMESPACE),
        &["component", "error_type"]
    ).expect("Failed to create ERRORS_TOTAL metric");

    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Application build information")
            .namespace(NAMESPACE),
        &["version"]
    ).expect("Failed to create BUILD_INFO metric");

    pub static ref UPTIME_SECONDS: Gauge = Gauge::with_opts(
        Opts::new("uptime_seconds", "Application uptime in seconds")
            .namespace(NAMESPACE)
    ).expect("Failed to create UPTIME_SECONDS metric");
}

pub fn init_metrics() -> Result<(), prometheus::Error> {
    // HTTP
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))?;

    // Protocol
    PROMETHEUS_REGISTRY.register(Box::new(PROTOCOL_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CAPABILITY_CALLS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CAPABILITY_CALL_DURATION_SECONDS.clone()))?;

    // Lifecycle
    PROMETHEUS_REGISTRY.register(Box::new(LIFECYCLE_TRANSITIONS_TOTAL.clone()))?;

    // Sync
    PROMETHEUS_REGISTRY.register(Box::new(SYNC_LAST_PASS_RECORDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SYNC_LAST_PASS_DURATION_MS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SYNC_PASSES_TOTAL.clone()))?;

    // Integrations
    PROMETHEUS_REGISTRY.register(Box::new(INTEGRATION_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(INTEGRATION_REQUEST_DURATION_SECONDS.clone()))?;

    // Scheduler
    PROMETHEUS_REGISTRY.register(Box::new(SCHEDULER_JOBS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SCHEDULER_RUNNING_JOBS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SCHEDULER_EXECUTIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SCHEDULER_EXECUTION_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SCHEDULER_LAST_EXECUTION_TIMESTAMP.clone()))?;

    // Errors & system
    PROMETHEUS_REGISTRY.register(Box::new(ERRORS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BUILD_INFO.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(UPTIME_SECONDS.clone()))?;

    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1.0);

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
