//! Metric identity and registry helpers.
//!
//! Every directory is published as one series of the
//! `directory_size_bytes` gauge family, labelled with the directory's
//! basename (`name`) and the configured path (`path`).

use prometheus::{Encoder, Registry, TextEncoder};

pub const NAMESPACE: &str = "directory";
pub const SIZE_METRIC: &str = "size_bytes";
pub const SIZE_HELP: &str = "Size of the directory in bytes.";

pub const LABEL_NAME: &str = "name";
pub const LABEL_PATH: &str = "path";

/// Content type of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Creates a registry pre-populated with process metrics (Linux only).
///
/// Each server or test owns its registry; nothing is registered globally.
pub fn new_registry() -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();
    #[cfg(target_os = "linux")]
    registry.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    ))?;
    Ok(registry)
}

/// Gathers every registered collector and renders the text exposition format.
///
/// Gathering runs collectors synchronously, so callers on an async runtime
/// should invoke this from a blocking context.
pub fn encode_text(registry: &Registry) -> Result<Vec<u8>, prometheus::Error> {
    let families = registry.gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf)?;
    Ok(buf)
}
