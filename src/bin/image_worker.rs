use std::net::SocketAddr;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;

use listings::config::{AppConfig, MediaBackendKind};
use listings::delivery::{shutdown_signal, worker::run_worker};
use listings::domain::job::IMAGE_UPLOAD_JOB;
use listings::repository::media::cloudinary::CloudinaryUploader;
use listings::repository::media::s3::S3Uploader;
use listings::repository::media::MediaBackend;
use listings::repository::nats::JetStreamJobQueue;
use listings::repository::postgres::{create_pool, PostgresPropertyRepository};
use listings::telemetry;
use listings::usecase::upload_worker::UploadWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load config")?;

    let tracer_provider = telemetry::init(
        &config.telemetry_config("image-worker"),
        config.telemetry_enabled,
    );
    tracing::info!(
        nats_url = %config.nats_url,
        media_backend = ?config.media_backend,
        concurrency = config.worker_concurrency,
        "starting image-worker"
    );

    let metrics_addr: SocketAddr = config
        .worker_metrics_addr
        .parse()
        .context("invalid WORKER_METRICS_ADDR")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    tracing::info!(%metrics_addr, "prometheus exporter listening");

    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to database")?;
    tracing::info!("connected to database");

    let media = match config.media_backend {
        MediaBackendKind::Cloudinary => MediaBackend::Cloudinary(
            CloudinaryUploader::new(config.cloudinary_settings(), config.media_timeout())
                .context("failed to build Cloudinary client")?,
        ),
        MediaBackendKind::S3 => MediaBackend::S3(S3Uploader::connect(config.s3_settings()).await?),
    };
    tracing::info!(media_backend = ?config.media_backend, "media backend configured");

    let nats_client = async_nats::connect(&config.nats_url)
        .await
        .context("failed to connect to NATS")?;
    tracing::info!(nats_url = %config.nats_url, "connected to NATS");

    let job_queue = JetStreamJobQueue::connect(nats_client, config.queue_settings())
        .await
        .context("failed to set up job queue")?;
    let consumer = job_queue
        .consumer(IMAGE_UPLOAD_JOB)
        .await
        .context("failed to create consumer")?;
    tracing::info!("consumer ready, starting job loop");

    let base_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let worker = UploadWorker::new(
        media,
        PostgresPropertyRepository::new(pool),
        job_queue,
        config.transform_profile(),
        base_dir,
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    run_worker(&consumer, &worker, config.worker_concurrency, shutdown).await;

    tracing::info!("image-worker stopped");
    if let Some(provider) = tracer_provider {
        telemetry::shutdown_telemetry(provider);
    }

    Ok(())
}
