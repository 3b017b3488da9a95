//! Scenecast batch worker binary.
//!
//! Renders every project given on the command line, or every project found
//! in `SCENECAST_PROJECTS_DIR` when none is given.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scenecast_models::ProjectId;
use scenecast_providers::{Dispatcher, ProviderFactory, RateLimiterRegistry, RetryPolicy};
use scenecast_storage::ProjectStore;
use scenecast_worker::{
    BatchProgress, BatchScheduler, PipelineConfig, PipelineContext, ProjectPipeline,
    SchedulerSettings, WorkerConfig,
};

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("scenecast=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting scenecast-worker");

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("invalid METRICS_ADDR")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);
    let pipeline_config = PipelineConfig::load(config.pipeline_config.as_deref())?;

    let store = ProjectStore::new(&config.projects_dir);
    let mut projects: Vec<ProjectId> = std::env::args()
        .skip(1)
        .map(ProjectId::from_string)
        .collect();
    if projects.is_empty() {
        projects = store.discover().await?;
    }
    if projects.is_empty() {
        warn!(dir = %config.projects_dir.display(), "No projects to render");
        return Ok(());
    }

    let limiters = Arc::new(RateLimiterRegistry::new());
    let chains = ProviderFactory::new(
        pipeline_config.providers.clone(),
        limiters,
        config.call_timeout,
    )
    .build()?;
    let dispatcher = Dispatcher::new(
        chains.text,
        chains.image,
        RetryPolicy::from(&pipeline_config.retry),
        config.call_timeout,
    );
    info!(
        text = ?dispatcher.text_backends(),
        image = ?dispatcher.image_backends(),
        "Generation chains ready"
    );

    let ctx = PipelineContext::new(Arc::new(pipeline_config), Arc::new(dispatcher), store.clone())
        .with_transcriber(chains.transcription)
        .with_max_scene_parallel(config.max_scene_parallel);
    let pipeline = Arc::new(ProjectPipeline::new(Arc::new(ctx)));
    let scheduler = BatchScheduler::new(pipeline, store.clone(), SchedulerSettings::from(&config));

    let token = scheduler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling batch");
            token.cancel();
        }
    });

    let progress = Arc::new(BatchProgress::new(projects.len()));
    let mut updates = progress.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = *updates.borrow_and_update();
            info!(
                completed = snapshot.completed,
                total = snapshot.total,
                "Batch progress"
            );
        }
    });

    let report = scheduler.run(projects, progress).await;
    let path = store.save_report(&report).await?;
    info!(report = %path.display(), "Batch report\n{}", report.summary());

    if report.succeeded == 0 {
        return Err(anyhow!("no job succeeded"));
    }
    Ok(())
}
