// src/crawl/mod.rs
// =============================================================================
// This module crawls the family graph.
//
// Features:
// - Breadth-first expansion from a single seed profile
// - Alternates profile -> union -> profile, reaching descendants and the
//   descendants of siblings
// - Several workers share one queue, one store and one rate budget
// - Failed requests go back on the queue until they succeed
// - Stops when the queue is empty and no worker is mid-request
//
// Submodules:
// - frontier: the shared work queue with quiescence detection
// - expand: decoding a response into new entities and the next ids to fetch
// - crawler: the worker pool and the run loop
// =============================================================================

mod crawler;
mod expand;
mod frontier;

pub use crawler::{CrawlSummary, Crawler};
