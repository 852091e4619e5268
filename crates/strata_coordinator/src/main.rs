//! Coordinator entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use strata_bus::{BusConfig, MessageBus};
use strata_coordinator::{router, AppState};
use strata_protocol::{defaults, SystemConfig};
use strata_state_store::JobStore;
use strata_store::ObjectStoreGateway;

#[derive(Parser, Debug)]
#[command(name = "strata-coordinator", about = "Strata lakehouse API")]
struct Args {
    #[arg(long, env = "QUEUE_HOST")]
    queue_host: String,
    #[arg(long, env = "QUEUE_PORT", default_value_t = 5672)]
    queue_port: u16,
    #[arg(long, env = "QUEUE_USER")]
    queue_user: String,
    #[arg(long, env = "QUEUE_PASS")]
    queue_pass: String,
    #[arg(long, env = "QUEUE_NAME", default_value = defaults::DEFAULT_QUEUE_NAME)]
    queue_name: String,

    #[arg(long, env = "STORE_ENDPOINT")]
    store_endpoint: String,
    #[arg(long, env = "STORE_ACCESS_KEY")]
    store_access_key: String,
    #[arg(long, env = "STORE_SECRET_KEY")]
    store_secret_key: String,
    #[arg(long, env = "UPLOADS_BUCKET")]
    uploads_bucket: String,
    #[arg(long, env = "WAREHOUSE_BUCKET")]
    warehouse_bucket: String,

    #[arg(long, env = "JOBSTORE_HOST")]
    jobstore_host: String,
    #[arg(long, env = "JOBSTORE_PORT", default_value_t = 6379)]
    jobstore_port: u16,

    #[arg(long, env = "WAREHOUSE_PATH", default_value = defaults::DEFAULT_WAREHOUSE_PATH)]
    warehouse_path: String,
    #[arg(long, env = "API_PORT", default_value_t = defaults::DEFAULT_API_PORT)]
    api_port: u16,
    #[arg(long, env = "FILE_MAX_SIZE", default_value_t = defaults::DEFAULT_FILE_MAX_SIZE)]
    file_max_size: u64,
    #[arg(long, env = "JOB_TTL_SECONDS", default_value_t = defaults::DEFAULT_JOB_TTL_SECONDS)]
    job_ttl_seconds: u64,
    #[arg(long, env = "PREVIEW_MAX_ROWS", default_value_t = defaults::DEFAULT_PREVIEW_MAX_ROWS)]
    preview_max_rows: usize,
}

impl Args {
    fn into_config(self) -> SystemConfig {
        SystemConfig {
            queue_host: self.queue_host,
            queue_port: self.queue_port,
            queue_user: self.queue_user,
            queue_pass: self.queue_pass,
            queue_name: self.queue_name,
            store_endpoint: self.store_endpoint,
            store_access_key: self.store_access_key,
            store_secret_key: self.store_secret_key,
            uploads_bucket: self.uploads_bucket,
            warehouse_bucket: self.warehouse_bucket,
            jobstore_host: self.jobstore_host,
            jobstore_port: self.jobstore_port,
            warehouse_path: self.warehouse_path,
            api_port: self.api_port,
            file_max_size: self.file_max_size,
            job_ttl_seconds: self.job_ttl_seconds,
            preview_max_rows: self.preview_max_rows,
            query_timeout_seconds: defaults::DEFAULT_QUERY_TIMEOUT_SECONDS,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Args::parse().into_config());
    let _log_guard = strata_logging::init_logging("strata-coordinator")?;

    let gateway = ObjectStoreGateway::connect(
        &config.store_endpoint,
        &config.store_access_key,
        &config.store_secret_key,
    );
    // Buckets are also created lazily on first put; doing it here surfaces
    // credential problems at startup instead of on the first upload.
    gateway.ensure_bucket(&config.uploads_bucket).await?;
    gateway.ensure_bucket(&config.warehouse_bucket).await?;

    let jobs = JobStore::connect(&config.jobstore_url(), config.job_ttl_seconds)
        .context("connect job store")?;
    let bus = Arc::new(
        MessageBus::connect(BusConfig {
            uri: config.amqp_uri(),
            queue_name: config.queue_name.clone(),
        })
        .await,
    );

    let state = AppState {
        config: config.clone(),
        gateway,
        jobs,
        bus,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.api_port))
        .await
        .with_context(|| format!("bind port {}", config.api_port))?;
    info!("Coordinator listening on port {}", config.api_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("serve")?;
    Ok(())
}
