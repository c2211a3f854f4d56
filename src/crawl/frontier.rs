// src/crawl/frontier.rs
// =============================================================================
// The crawl's work queue.
//
// Many workers push and pop FetchRequests concurrently. Besides the queue
// itself the frontier counts "outstanding" requests: pushed but not yet
// marked done. A request stays outstanding while a worker processes it, so
// the count only reaches zero once nothing is queued and nothing is in flight.
// join() waits for exactly that moment, and it is how the crawl knows it has
// finished.
//
// The rule every worker must follow:
//   pop() -> process -> push() everything it discovered -> mark_done()
// Calling mark_done() before the pushes could let the count touch zero while
// more work is about to appear, and join() would return too early.
//
// Pieces:
// - queue: the requests themselves, FIFO (breadth-first)
// - ready: a semaphore with one permit per queued request; pop() waits on it
// - outstanding: a watch channel holding the count; join() waits for zero
// =============================================================================

use crate::api::FetchRequest;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::{watch, Semaphore};
use tracing::warn;

#[derive(Debug)]
pub struct Frontier {
    queue: Mutex<VecDeque<FetchRequest>>,
    ready: Semaphore,
    outstanding: watch::Sender<usize>,
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontier {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Semaphore::new(0),
            outstanding,
        }
    }

    /// Adds a request to the back of the queue
    pub fn push(&self, request: FetchRequest) {
        // Count first: the request must be outstanding before anyone can pop it
        self.outstanding.send_modify(|n| *n += 1);
        self.queue.lock().push_back(request);
        self.ready.add_permits(1);
    }

    /// Takes the next request, waiting while the queue is empty
    ///
    /// Returns None once the frontier has been closed.
    pub async fn pop(&self) -> Option<FetchRequest> {
        let permit = self.ready.acquire().await.ok()?;
        permit.forget();
        self.queue.lock().pop_front()
    }

    /// Marks one popped request as fully processed
    pub fn mark_done(&self) {
        self.outstanding.send_modify(|n| {
            if *n == 0 {
                warn!("mark_done called more times than requests were pushed");
            } else {
                *n -= 1;
            }
        });
    }

    /// Waits until every pushed request has been popped and marked done
    pub async fn join(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Wakes every waiting pop() with None
    pub fn close(&self) {
        self.ready.close();
    }

    /// Requests waiting in the queue
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Requests pushed but not yet marked done (queued plus in flight)
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }
}

/// Marks the popped request done when dropped
///
/// Holding one of these for the whole processing of a request means
/// mark_done() runs after all of its pushes, even if processing panics.
pub struct DoneGuard<'a> {
    frontier: &'a Frontier,
}

impl<'a> DoneGuard<'a> {
    pub fn new(frontier: &'a Frontier) -> Self {
        Self { frontier }
    }
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.frontier.mark_done();
    }
}
