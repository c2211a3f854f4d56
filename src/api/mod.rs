// src/api/mod.rs
// =============================================================================
// Everything that talks to the remote Geni API.
//
// Submodules:
// - rate_limit: sliding-window budget shared by all workers
// - request: the FetchRequest unit of work and per-kind field lists
// - client: the EntitySource trait and its HTTP implementation
// =============================================================================

mod client;
mod rate_limit;
mod request;

pub use client::{EntitySource, GeniClient, DEFAULT_API_BASE};
#[cfg(test)]
pub use client::{normalize_results, FetchError};
pub use rate_limit::RateLimiter;
pub use request::{FetchRequest, DEFAULT_MAX_IDS};
