// src/api/client.rs
// =============================================================================
// Fetches batches of entities from the Geni API.
//
// The crawler only sees the EntitySource trait, so tests can swap the HTTP
// client for an in-memory fake.
//
// Every request:
// 1. Waits on the shared RateLimiter
// 2. GETs {api_base}/{profile|union}?ids=...&fields=...
// 3. Treats any non-2xx status, transport error or timeout as a FetchError
//    (the crawler retries those)
// 4. Normalizes the body into a list: multi-id requests answer with
//    {"results": [...]}, single-id requests with the bare entity
// =============================================================================

use super::rate_limit::RateLimiter;
use super::request::FetchRequest;
use crate::model::EntityKind;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://www.geni.com/api";

/// Why a batch could not be fetched. All of these are retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(StatusCode),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response body is neither an entity nor a result list")]
    Body,
}

/// Anything that can answer a batch fetch
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Returns the raw entity objects for one request
    async fn fetch_batch(&self, request: &FetchRequest) -> Result<Vec<Value>, FetchError>;
}

/// Rate-limited HTTP client for the two batch endpoints
#[derive(Debug)]
pub struct GeniClient {
    client: Client,
    profile_endpoint: Url,
    union_endpoint: Url,
    limiter: Arc<RateLimiter>,
}

impl GeniClient {
    /// Builds a client whose connection pool matches the worker count
    pub fn new(
        api_base: &str,
        workers: usize,
        timeout: Duration,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        // A trailing slash makes join() append instead of replacing the last segment
        let base = format!("{}/", api_base.trim_end_matches('/'));
        let base = Url::parse(&base).with_context(|| format!("Invalid API base '{}'", api_base))?;
        if base.cannot_be_a_base() {
            bail!("API base '{}' cannot hold endpoint paths", api_base);
        }

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(workers.max(1))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        debug!(
            "API client for {} ({} call(s) per {}s, pool of {})",
            base,
            limiter.limit(),
            limiter.window().as_secs(),
            workers.max(1)
        );

        Ok(Self {
            client,
            profile_endpoint: base.join("profile")?,
            union_endpoint: base.join("union")?,
            limiter,
        })
    }

    /// The full URL for a request
    pub fn endpoint(&self, request: &FetchRequest) -> Url {
        let mut url = match request.kind {
            EntityKind::Person => self.profile_endpoint.clone(),
            EntityKind::Union => self.union_endpoint.clone(),
        };
        url.query_pairs_mut()
            .append_pair("ids", &request.joined_ids())
            .append_pair("fields", &request.joined_fields());
        url
    }
}

#[async_trait]
impl EntitySource for GeniClient {
    async fn fetch_batch(&self, request: &FetchRequest) -> Result<Vec<Value>, FetchError> {
        // Wait for a slot in the shared budget before touching the network
        self.limiter.acquire().await;

        let url = self.endpoint(request);
        debug!("Requesting endpoint: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        // Either {"results": [...]} or a single entity
        let body: Value = response.json().await?;
        normalize_results(body).ok_or(FetchError::Body)
    }
}

/// Turns either response shape into a list of entity objects
pub fn normalize_results(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(results)) => Some(results),
            // Not a result list after all; keep the object whole
            Some(other) => {
                map.insert("results".to_string(), other);
                Some(vec![Value::Object(map)])
            }
            None => Some(vec![Value::Object(map)]),
        },
        Value::Array(items) => Some(items),
        _ => None,
    }
}
