//! Tracing subscriber setup.

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/// Crates whose events are shown at the requested level.
const LOG_TARGETS: &[&str] = &["prom_dirsize_exporter", "dirsize_exporter", "dirsize_core"];

/// Picks the log level: INFO by default, `-v` for DEBUG, `-vv` for TRACE,
/// `-q` for errors only.
pub fn level_for(verbose: u8, quiet: bool) -> Level {
    if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Initializes the global subscriber.
///
/// `RUST_LOG` directives are honored on top of the verbosity flags.
/// `APP_ENV=dev` selects human-readable output; anything else emits JSON lines.
pub fn init_logging(verbose: u8, quiet: bool) -> anyhow::Result<()> {
    let level = level_for(verbose, quiet);

    let mut filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        let directive: Directive = format!("{target}={level}")
            .parse()
            .with_context(|| format!("invalid log directive for {target}"))?;
        filter = filter.add_directive(directive);
    }

    let dev = std::env::var("APP_ENV").is_ok_and(|v| v == "dev");
    let result = if dev {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
