use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;

use listings::config::AppConfig;
use listings::delivery::{http, shutdown_signal};
use listings::domain::job::IMAGE_UPLOAD_JOB;
use listings::repository::nats::JetStreamJobQueue;
use listings::repository::postgres::{create_pool, PostgresPropertyRepository};
use listings::telemetry;
use listings::usecase::jobs::JobsUseCase;
use listings::usecase::properties::PropertiesUseCase;
use listings::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load config")?;

    let tracer_provider = telemetry::init(
        &config.telemetry_config("listings-api"),
        config.telemetry_enabled,
    );
    tracing::info!("starting the listings service");
    tracing::info!("config loaded, telemetry_enabled={}", config.telemetry_enabled);

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    metrics_process::Collector::default().describe();
    tracing::info!("prometheus metrics initialized");

    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("failed to create database pool")?;
    tracing::info!("database pool created");

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("database migrations applied");

    let nats_client = async_nats::connect(&config.nats_url)
        .await
        .context("failed to connect to NATS")?;
    tracing::info!(nats_url = %config.nats_url, "connected to NATS");

    let job_queue = JetStreamJobQueue::connect(nats_client, config.queue_settings())
        .await
        .context("failed to set up job queue")?;
    tracing::info!("job queue ready");

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create upload dir {}", config.upload_dir.display()))?;

    let repository = PostgresPropertyRepository::new(pool);
    let shared_state = Arc::new(AppState {
        properties_usecase: PropertiesUseCase::new(repository.clone(), job_queue.clone()),
        jobs_usecase: JobsUseCase::new(job_queue, IMAGE_UPLOAD_JOB),
        api_keys: repository,
        upload_dir: config.upload_dir.clone(),
        metrics_handle,
    });

    let router = http::router(shared_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(bind_addr = %config.bind_addr, "listings service running");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("listings service stopped");
    if let Some(provider) = tracer_provider {
        telemetry::shutdown_telemetry(provider);
    }

    Ok(())
}
