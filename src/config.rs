// src/config.rs
// =============================================================================
// Settings for one crawl run, gathered from the command line.
// =============================================================================

use crate::api::{DEFAULT_API_BASE, DEFAULT_MAX_IDS};
use crate::model::EntityId;
use std::path::PathBuf;
use std::time::Duration;

/// Sophia of Hanover
pub const DEFAULT_SEED: &str = "profile-56847813";

/// The public budget is 10 calls per 10 seconds; stay a little under it.
pub const DEFAULT_RATE_LIMIT: usize = 9;
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 11;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seed: EntityId,
    pub workers: usize,
    pub db: PathBuf,
    pub api_base: String,
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub max_ids: usize,
    pub timeout: Duration,
    /// Fetch (without expanding) partners that married into the crawled family
    pub fetch_partners: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seed: EntityId::person(56847813),
            workers: 1,
            db: PathBuf::from("db.json"),
            api_base: DEFAULT_API_BASE.to_string(),
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
            max_ids: DEFAULT_MAX_IDS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            fetch_partners: true,
        }
    }
}
