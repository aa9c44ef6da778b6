//! prom-dirsize-exporter - exports directory sizes to Prometheus.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use dirsize_exporter::cli::{Cli, Command, ServeArgs};
use dirsize_exporter::logging::init_logging;
use dirsize_exporter::version::{VERSION, version_info};
use dirsize_exporter::{MetricsServer, build_registry};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            print!("{}", version_info());
            ExitCode::SUCCESS
        }
        Command::Serve(args) => {
            if let Err(e) = init_logging(cli.verbose, cli.quiet) {
                eprintln!("{e:#}");
                return ExitCode::FAILURE;
            }
            match serve(args) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = format!("{e:#}"), "exporter failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args
        .resolve(|name| std::env::var(name).ok())
        .context("invalid configuration")?;

    info!(version = VERSION, "prom-dirsize-exporter starting");

    let registry = build_registry(&config).context("failed to set up metrics")?;
    let server = Arc::new(
        MetricsServer::new(config.server.clone(), registry).context("invalid server configuration")?,
    );

    // SIGINT and SIGTERM (ctrlc "termination" feature).
    let signalled = Arc::clone(&server);
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        signalled.stop();
    })
    .context("failed to install signal handler")?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(server.start())?;

    Ok(())
}
