use anyhow::Context;
use incident_kb_mcp::{
    api::{build_router, AppState},
    config::Config,
    scheduler::{kb_sync_job, SchedulerService},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::defaults().unwrap_or_else(|e| {
            eprintln!("Embedded defaults are invalid: {}", e);
            std::process::exit(1);
        })
    });

    // Initialize tracing
    let json_logs = config.observability.json_logs;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "incident_kb_mcp={},tower_http=info",
                    config.observability.log_level
                )
                .into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!(
        service = %config.observability.service_name,
        "Starting {} v{}",
        config.identity.name,
        config.identity.version
    );

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = incident_kb_mcp::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("✅ Prometheus metrics initialized");
        }
    } else {
        tracing::info!("⚠️  Prometheus metrics disabled in configuration");
    }

    tracing::info!("Storage backend: {:?}", config.state.backend);
    let state = AppState::from_config(&config)
        .await
        .context("failed to assemble service")?;
    tracing::info!(
        tools = state.server.registry().len(),
        corpus = %config.corpus.root.display(),
        "✅ Capability registry initialized"
    );

    // Scheduled corpus sync
    let mut scheduler = SchedulerService::new(config.sync.enabled).await?;
    if config.sync.enabled {
        scheduler
            .add_job(kb_sync_job(state.pipeline.clone(), &config.sync.schedule))
            .await?;
        scheduler.start().await?;
        tracing::info!(schedule = %config.sync.schedule, "✅ Corpus sync scheduled");
    } else {
        tracing::info!("⚠️  Scheduled corpus sync disabled in configuration");
    }

    let app = build_router(state);

    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {}", http_addr))?;

    tracing::info!("🚀 HTTP server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   MCP endpoint: http://{}/mcp", http_addr);
    tracing::info!("   Sync trigger: http://{}/v1/sync", http_addr);

    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = http_handle => {
            tracing::warn!("HTTP server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shutting down gracefully...");
    for job in scheduler.list_jobs().await {
        tracing::info!(
            job_name = %job.name,
            runs = job.run_count,
            success_rate = job.success_rate(),
            last_error = ?job.last_error,
            "Scheduled job summary"
        );
    }
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown failed: {}", e);
    }
    Ok(())
}
