mod config;
mod poller;


use anyhow::Context;
use config::{LogFormat, WorkerConfig};
use tokio::signal;
use tracing::{error, info, warn};
use vessel_core::{DockerRuntime, ExecutionEngine, ExecutionStore, RuntimeClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    init_tracing(config.log_format);

    info!("Vessel worker booting...");
    info!(
        data_dir = %config.store.data_dir.display(),
        poll_interval_secs = config.poll_interval.as_secs(),
        max_concurrent_checks = config.max_concurrent_checks,
        "Worker configured"
    );

    let runtime = DockerRuntime::connect().map_err(|e| {
        error!("Failed to connect to Docker: {}", e);
        e
    })?;
    let engine = ExecutionEngine::new(ExecutionStore::new(&config.store), runtime);

    // Setup graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
        warn!("Received shutdown signal, stopping poller...");
    };

    tokio::select! {
        result = poll_loop(&engine, &config) => result?,
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init(),
    }
}

async fn poll_loop<R: RuntimeClient>(
    engine: &ExecutionEngine<R>,
    config: &WorkerConfig,
) -> anyhow::Result<()> {
    loop {
        let started = std::time::Instant::now();
        match poller::sweep(engine, config.max_concurrent_checks).await {
            Ok(stats) => {
                info!(
                    listed = stats.listed,
                    settled = stats.settled,
                    waiting = stats.waiting,
                    captured = stats.captured,
                    failed = stats.failed,
                    sweep_ms = started.elapsed().as_millis() as u64,
                    "Sweep finished"
                );
            }
            Err(e) => {
                // Store unreadable this round - keep polling
                error!(error = %e, "Sweep failed");
            }
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}
