//! Terminology server binary.

use terminology_engine::{load_directory, TerminologyEngine};
use terminology_service::{run_pre_expansion_worker, ServiceConfig, TerminologyServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServiceConfig::from_env();
    tracing::info!(
        pre_expand = config.engine.pre_expand_value_sets,
        queue_capacity = config.engine.deferred_queue_capacity,
        max_expansion = config.engine.max_expansion_size,
        "Starting terminology server"
    );

    let engine = TerminologyEngine::in_memory(config.engine.clone())?;

    if config.data_path.is_dir() {
        tracing::info!("Loading terminology data from: {}", config.data_path.display());
        let stats = load_directory(&engine, &config.data_path, &config.csv)?;
        tracing::info!(
            "Loaded {} code systems, {} value sets and {} concepts in {} ms",
            stats.code_systems,
            stats.value_sets,
            stats.concepts,
            stats.load_time_ms
        );
    } else {
        tracing::warn!(
            "Data directory {} not found, serving built-in terminologies only",
            config.data_path.display()
        );
    }

    let server = TerminologyServer::new(engine);

    let worker = config.engine.pre_expand_value_sets.then(|| {
        tokio::spawn(run_pre_expansion_worker(
            server.clone(),
            config.refresh_interval,
        ))
    });

    tracing::info!("Terminology server ready, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    server.shutdown();
    if let Some(worker) = worker {
        let totals = worker.await?;
        tracing::info!(
            "Pre-expanded {} value sets ({} failed, {} still deferred)",
            totals.processed,
            totals.failed,
            totals.remaining
        );
    }

    Ok(())
}
