use anyhow::Context;
use clap::Parser;
use lockd_server::startup::{self, ShutdownSignal};
use lockd_server::{Cli, Configuration, metrics};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let configuration = Configuration::load(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;

    // Held until exit so buffered log output is flushed
    let _logging_guard = startup::init_logging(&configuration.logging_config())?;
    startup::install_panic_hook();
    metrics::init_metrics();

    let worker_threads = configuration.worker_threads()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .thread_name("lockd-worker")
        .enable_all()
        .build()
        .context("failed to build the async runtime")?;

    info!(
        config = %cli.config.display(),
        worker_threads,
        "Starting lockd server"
    );

    runtime.block_on(run(configuration))
}

async fn run(configuration: Configuration) -> anyhow::Result<()> {
    let server = startup::build_server(&configuration).await?;
    let shutdown: ShutdownSignal = startup::wait_for_shutdown_signal();

    server.serve_with_shutdown(shutdown.recv()).await;

    info!("lockd server exited");
    Ok(())
}
