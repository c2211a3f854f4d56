// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging
// 3. Dispatch to the appropriate subcommand handler
// 4. Exit with proper code (0 = success, 2 = error)
// =============================================================================

mod api;       // src/api/ - rate-limited access to the remote API
mod cli;       // src/cli.rs - command-line parsing
mod config;    // src/config.rs - crawl settings
mod crawl;     // src/crawl/ - frontier, expansion rules and the worker pool
mod export;    // src/export.rs - flattening the store into rows
mod logging;   // src/logging.rs - tracing subscriber setup
mod model;     // src/model/ - ids, persons and unions
mod store;     // src/store.rs - the deduplicated local store

use anyhow::{bail, Result};
use api::{GeniClient, RateLimiter};
use clap::Parser;
use cli::{Cli, Commands, CrawlArgs};
use crawl::{CrawlSummary, Crawler};
use std::path::Path;
use std::sync::Arc;
use store::EntityStore;
use tracing::info;

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init_logging()?;

    match cli.command {
        Commands::Crawl(args) => handle_crawl(&args).await,
        Commands::Export { db, out, json } => handle_export(&db, &out, json),
    }
}

// Handles the 'crawl' subcommand
async fn handle_crawl(args: &CrawlArgs) -> Result<i32> {
    let config = args.config();

    println!("🔍 Crawling from {}", config.seed);
    println!(
        "📊 Workers: {}, rate limit: {} calls per {}s, batch size: {}",
        config.workers,
        config.rate_limit,
        config.rate_window.as_secs(),
        config.max_ids
    );

    let store = Arc::new(EntityStore::open(&config.db)?);
    let limiter = Arc::new(RateLimiter::new(config.rate_limit, config.rate_window));
    let client = GeniClient::new(&config.api_base, config.workers, config.timeout, limiter)?;

    let crawler = Crawler::new(Arc::new(client), Arc::clone(&store), &config);
    let result = crawler.run(config.seed).await;

    // Keep whatever was gathered, even if the crawl failed
    store.close()?;
    let summary = result?;
    info!("Geni requests done!");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(0)
}

// Handles the 'export' subcommand
fn handle_export(db: &Path, out: &Path, json: bool) -> Result<i32> {
    if !db.exists() {
        bail!("Store {} does not exist; run `crawl` first", db.display());
    }

    let store = EntityStore::open(db)?;
    println!("📄 Processing store into rows...");

    let rows = export::to_rows(&store);
    export::write_rows(&rows, out, json)?;

    println!("✅ Wrote {} row(s) to {}", rows.len(), out.display());
    Ok(0)
}

fn print_summary(summary: &CrawlSummary) {
    println!();
    println!("📊 Summary:");
    println!("   👤 Profiles: {}", summary.persons);
    println!("   💍 Unions: {}", summary.unions);
    println!(
        "   🌐 Requests: {} ({} failed and retried)",
        summary.requests, summary.failures
    );
    println!("   ⏱️  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
}
