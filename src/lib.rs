pub mod config;
pub mod delivery;
pub mod domain;
pub mod repository;
pub mod telemetry;
pub mod usecase;

use std::path::PathBuf;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::repository::nats::JetStreamJobQueue;
use crate::repository::postgres::PostgresPropertyRepository;
use crate::usecase::jobs::JobsUseCase;
use crate::usecase::properties::PropertiesUseCase;

pub struct AppState {
    pub properties_usecase: PropertiesUseCase<PostgresPropertyRepository, JetStreamJobQueue>,
    pub jobs_usecase: JobsUseCase<JetStreamJobQueue>,
    pub api_keys: PostgresPropertyRepository,
    pub upload_dir: PathBuf,
    pub metrics_handle: PrometheusHandle,
}
