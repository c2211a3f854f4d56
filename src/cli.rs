// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Two subcommands:
// - crawl: mirror the family graph around a seed profile into a local store
// - export: flatten a store into one row per public person
// =============================================================================

use crate::config::{
    CrawlConfig, DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW_SECS, DEFAULT_SEED, DEFAULT_TIMEOUT_SECS,
};
use crate::api::{DEFAULT_API_BASE, DEFAULT_MAX_IDS};
use crate::model::EntityId;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "geni-crawler",
    version = "0.1.0",
    about = "Mirror a Geni family graph into a local store",
    long_about = "geni-crawler starts from one profile and follows unions and children until \
                  no new profiles are reachable, staying under the API's rate limit. \
                  The result can then be exported as one row per person."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl the descendants of a seed profile (including siblings' lines)
    ///
    /// Example: geni-crawler crawl --seed profile-56847813 --workers 4
    Crawl(CrawlArgs),

    /// Export a crawled store as rows
    ///
    /// Example: geni-crawler export --db db.json --out geni.yml
    Export {
        /// Store file written by `crawl`
        #[arg(long, default_value = "db.json")]
        db: PathBuf,

        /// Output file
        #[arg(long, default_value = "geni.yml")]
        out: PathBuf,

        /// Write JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Profile to start from (default is Sophia of Hanover)
    #[arg(long, default_value = DEFAULT_SEED)]
    pub seed: EntityId,

    /// Number of workers making requests at the same time
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Store file; an existing store is resumed
    #[arg(long, default_value = "db.json")]
    pub db: PathBuf,

    /// Base URL of the API
    #[arg(long, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Maximum calls per rate window
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT)]
    pub rate_limit: usize,

    /// Length of the rate window, in seconds
    #[arg(long, default_value_t = DEFAULT_RATE_WINDOW_SECS)]
    pub rate_window: u64,

    /// Maximum ids per request
    #[arg(long, default_value_t = DEFAULT_MAX_IDS)]
    pub max_ids: usize,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Do not fetch partners who married into the family
    #[arg(long)]
    pub no_partners: bool,

    /// Print the crawl summary as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl CrawlArgs {
    pub fn config(&self) -> CrawlConfig {
        CrawlConfig {
            seed: self.seed,
            workers: self.workers,
            db: self.db.clone(),
            api_base: self.api_base.clone(),
            rate_limit: self.rate_limit,
            rate_window: Duration::from_secs(self.rate_window),
            max_ids: self.max_ids,
            timeout: Duration::from_secs(self.timeout),
            fetch_partners: !self.no_partners,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawl_config(args: &[&str]) -> CrawlConfig {
        match Cli::parse_from(args).command {
            Commands::Crawl(crawl) => crawl.config(),
            other => panic!("expected crawl, got {:?}", other),
        }
    }

    #[test]
    fn test_crawl_defaults() {
        let config = crawl_config(&["geni-crawler", "crawl"]);
        assert_eq!(config.seed, EntityId::person(56847813));
        assert_eq!(config.workers, 1);
        assert_eq!(config.rate_limit, 9);
        assert_eq!(config.rate_window, Duration::from_secs(11));
        assert_eq!(config.max_ids, 40);
        assert!(config.fetch_partners);
    }

    #[test]
    fn test_crawl_flags() {
        let config = crawl_config(&[
            "geni-crawler", "crawl", "--seed", "profile-42", "--workers", "8",
            "--max-ids", "10", "--no-partners",
        ]);
        assert_eq!(config.seed, EntityId::person(42));
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_ids, 10);
        assert!(!config.fetch_partners);
    }

    #[test]
    fn test_bad_seed_is_rejected() {
        assert!(Cli::try_parse_from(["geni-crawler", "crawl", "--seed", "nobody"]).is_err());
    }

    #[test]
    fn test_export_args() {
        let cli = Cli::parse_from(["geni-crawler", "export", "--out", "rows.json", "--json"]);
        match cli.command {
            Commands::Export { db, out, json } => {
                assert_eq!(db, PathBuf::from("db.json"));
                assert_eq!(out, PathBuf::from("rows.json"));
                assert!(json);
            }
            other => panic!("expected export, got {:?}", other),
        }
    }
}
