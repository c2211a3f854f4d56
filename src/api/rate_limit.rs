// src/api/rate_limit.rs
// =============================================================================
// Sliding-window rate limiter shared by every worker.
//
// Guarantee: no interval of `window` length ever contains more than `limit`
// calls that went through acquire().
//
// How it works:
// 1. Keep the start times of recent calls, oldest first
// 2. On acquire(), forget the ones older than `window`
// 3. If `limit` calls are still inside the window, sleep until the oldest
//    one falls out
// 4. Record "now" for the call about to happen
//
// Steps 2-4 run while holding one async mutex, including the sleep. Two
// workers can never both see a free slot that only one of them may use.
// =============================================================================

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Allows at most `limit` calls in any `window`
    ///
    /// A limit of 0 would block forever, so it is treated as 1.
    pub fn new(limit: usize, window: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            window,
            calls: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Waits until one more call fits in the budget, then claims the slot
    pub async fn acquire(&self) {
        let mut calls = self.calls.lock().await;

        loop {
            let now = Instant::now();
            while calls
                .front()
                .is_some_and(|&oldest| now.duration_since(oldest) >= self.window)
            {
                calls.pop_front();
            }

            if calls.len() < self.limit {
                break;
            }

            // Full window: wait for the oldest call to expire
            if let Some(&oldest) = calls.front() {
                let ready_at = oldest + self.window;
                info!(
                    "Waiting {:.2} seconds for rate limit",
                    ready_at.saturating_duration_since(now).as_secs_f64()
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }

        calls.push_back(Instant::now());
    }
}
