mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Settings};
use tracing_subscriber::prelude::*;

fn main() -> anyhow::Result<()> {
    // Initialize tracing with env-declared filters. Stdout carries the result.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "feast=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let pretty = cli.pretty;

    //
    // Load configuration.
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let config = cli.into_configuration(settings)?;
    tracing::debug!("{config:?}");

    //
    // Size the runtime from the parallelism limit.
    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    if let Some(threads) = cli::worker_threads(config.max_process) {
        runtime.worker_threads(threads);
    }
    let runtime = runtime
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let harvest = runtime
        .block_on(feast::eat(config))
        .context("Unable to complete the batch")?;

    if harvest.interrupted {
        tracing::warn!("Batch interrupted, output is partial");
    }

    let output = if pretty {
        serde_json::to_string_pretty(&harvest)
    } else {
        serde_json::to_string(&harvest)
    }
    .context("Failed to serialize the result")?;
    println!("{output}");

    Ok(())
}
