// src/logging.rs
// =============================================================================
// Log output setup.
//
// Logs go to stderr in tracing's compact format. The level comes from
// RUST_LOG (e.g. RUST_LOG=debug, or RUST_LOG=geni_crawler=debug,reqwest=warn)
// and defaults to "info", which shows every added profile and union.
// =============================================================================

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
