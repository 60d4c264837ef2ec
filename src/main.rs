//! rvsimd server binary.

#![forbid(unsafe_code)]

use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rvsimd::cli::Cli;
use rvsimd::config::Config;
use rvsimd::dispatcher::Dispatcher;
use rvsimd::server;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = main_impl() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn main_impl() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);

    if !config.worker_path.exists() {
        tracing::warn!(
            path = %config.worker_path.display(),
            "worker binary not found; sessions will fail to spawn until it exists"
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&config)));
    let sweeper = dispatcher.registry().spawn_sweeper();

    let result = server::serve(&config.listen_addr, Arc::clone(&dispatcher)).await;
    sweeper.abort();
    result.map_err(Into::into)
}
