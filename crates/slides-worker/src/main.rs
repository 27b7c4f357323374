//! Post-processing worker binary.
//!
//! Usage: `slides-worker <session-folder>...`, folders relative to
//! `SLIDES_OUTPUT_DIR`. Each folder becomes one job.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slides_media::SimilarityPool;
use slides_ml_client::ClassificationClient;
use slides_storage::{SlideStore, StoreConfig};
use slides_worker::{JobExecutor, JobQueue, Orchestrator, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("slides=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    let folders: Vec<String> = std::env::args().skip(1).collect();
    if folders.is_empty() {
        error!("Usage: slides-worker <session-folder>...");
        std::process::exit(2);
    }

    info!("Starting slides-worker");

    let config = WorkerConfig::from_env();
    info!(?config, "Worker config");

    let classifier = match ClassificationClient::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create classification client: {}", e);
            std::process::exit(1);
        }
    };
    if config.enable_ai_filtering && !classifier.is_configured() {
        warn!("Classification service is not configured; AI filtering will fail per batch");
    }

    let store = SlideStore::from_config(&StoreConfig::from_env());
    let orchestrator = match Orchestrator::new(
        store.clone(),
        SimilarityPool::default(),
        Arc::new(classifier),
        config,
    ) {
        Ok(o) => o,
        Err(e) => {
            error!("Invalid worker configuration: {}", e);
            std::process::exit(1);
        }
    };

    let queue = Arc::new(JobQueue::new());
    for folder in &folders {
        let dir = match store.session_dir(folder) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(folder = %folder, "Skipping session: {}", e);
                continue;
            }
        };
        match store.list_slide_files(&dir).await {
            Ok(files) => {
                queue.add_job(folder, &dir.display().to_string(), files);
            }
            Err(e) => warn!(folder = %folder, "Skipping session: {}", e),
        }
    }

    let executor = Arc::new(JobExecutor::new(Arc::clone(&queue), Arc::new(orchestrator)));

    // Ctrl-C stops the executor after the running job
    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    executor.run_until_idle().await;

    for job in queue.jobs() {
        info!(
            job_id = %job.id,
            task_id = %job.task_id,
            status = %job.status,
            duplicates = job.progress.duplicates_removed,
            excluded = job.progress.excluded_removed,
            ai_filtered = job.progress.ai_filtered,
            errors = job.errors.len(),
            "Job summary"
        );
    }

    let counts = queue.counts();
    info!(
        completed = counts.completed,
        failed = counts.failed,
        queued = counts.queued,
        "Worker shutdown complete"
    );
}
