// src/crawl/crawler.rs
// =============================================================================
// The worker pool that drives a crawl.
//
// How a run works:
// 1. Spawn N workers, all pulling from one Frontier
// 2. Push a request for the seed profile, plus whatever a previous run left
//    unfinished in the store (see below)
// 3. Each worker loops:
//      pop a request
//      fetch it (through the shared rate limiter)
//      failure -> push the same request back (it will be retried)
//      success -> decode, insert new entities, push batches for the ids
//                 they reference that we have not stored yet
//      mark the request done
// 4. frontier.join() returns once nothing is queued or in flight: the whole
//    reachable family is in the store
// 5. Optionally fetch, without expanding, the partners the crawl referenced
//    but never reached, and wait for quiescence again
// 6. Close the frontier so the workers exit
//
// Resuming:
// A stored entity is never expanded again, so a rerun over a partial store
// cannot rediscover the gaps from the seed alone. Instead the gaps are read
// off the store itself: unions of expanded persons that are not stored, and
// biological children of stored unions that are not stored. Expanded persons
// are the seed and the biological children of stored unions; partners that
// only came in through partner completion are left alone.
//
// Retries are unbounded: a request that keeps failing keeps coming back.
// The rate limiter is the only pacing. A worker that panics fails the run.
// =============================================================================

use super::expand;
use super::frontier::{DoneGuard, Frontier};
use crate::api::{EntitySource, FetchRequest};
use crate::config::CrawlConfig;
use crate::model::{Entity, EntityId, EntityKind};
use crate::store::EntityStore;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Totals for a finished crawl
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub persons: usize,
    pub unions: usize,
    pub requests: u64,
    pub failures: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

pub struct Crawler {
    source: Arc<dyn EntitySource>,
    store: Arc<EntityStore>,
    frontier: Frontier,
    workers: usize,
    max_ids: usize,
    fetch_partners: bool,
    requests: AtomicU64,
    failures: AtomicU64,
}

impl Crawler {
    pub fn new(source: Arc<dyn EntitySource>, store: Arc<EntityStore>, config: &CrawlConfig) -> Self {
        Self {
            source,
            store,
            frontier: Frontier::new(),
            workers: config.workers.max(1),
            max_ids: config.max_ids.max(1),
            fetch_partners: config.fetch_partners,
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Crawls everything reachable from `seed` into the store
    pub async fn run(self, seed: EntityId) -> Result<CrawlSummary> {
        let started = Instant::now();
        let crawler = Arc::new(self);

        // Pick up where an earlier run over the same store stopped. Read the
        // gaps before any worker can add to the store.
        let (unions, persons) = crawler.unfinished(seed);

        // Start the workers; they block in pop() until work arrives
        let mut workers = JoinSet::new();
        for worker in 0..crawler.workers {
            let crawler = Arc::clone(&crawler);
            workers.spawn(async move { crawler.work(worker).await });
        }

        info!("Crawling from {} with {} worker(s)", seed, crawler.workers);
        crawler.frontier.push(FetchRequest::new(seed.kind, vec![seed]));
        if !unions.is_empty() || !persons.is_empty() {
            info!(
                "Resuming: {} union(s) and {} profile(s) still to fetch",
                unions.len(),
                persons.len()
            );
        }
        for batch in FetchRequest::batches(EntityKind::Union, &unions, crawler.max_ids) {
            crawler.frontier.push(batch);
        }
        for batch in FetchRequest::batches(EntityKind::Person, &persons, crawler.max_ids) {
            crawler.frontier.push(batch);
        }

        crawler.wait_quiescent(&mut workers).await?;
        info!(
            "Family crawl done: {} profiles, {} unions",
            crawler.store.count(EntityKind::Person),
            crawler.store.count(EntityKind::Union)
        );

        if crawler.fetch_partners {
            let partners = crawler.missing_partners();
            if !partners.is_empty() {
                info!("Fetching {} partner profile(s)", partners.len());
                for batch in FetchRequest::leaf_batches(EntityKind::Person, &partners, crawler.max_ids) {
                    crawler.frontier.push(batch);
                }
                crawler.wait_quiescent(&mut workers).await?;
            }
        }

        // Idle workers see None from pop() and return
        crawler.frontier.close();
        while let Some(result) = workers.join_next().await {
            result.context("Crawl worker panicked")?;
        }

        Ok(crawler.summary(started.elapsed()))
    }

    /// Waits for the frontier to drain, failing if a worker dies first
    ///
    /// Workers only return after close(), so any worker that finishes here
    /// has panicked and taken its request with it. Returning the error drops
    /// the JoinSet, which aborts the remaining workers.
    async fn wait_quiescent(&self, workers: &mut JoinSet<()>) -> Result<()> {
        tokio::select! {
            _ = self.frontier.join() => Ok(()),
            Some(result) = workers.join_next() => {
                self.frontier.close();
                result.context("Crawl worker panicked")?;
                bail!("Crawl worker stopped before the crawl finished")
            }
        }
    }

    async fn work(&self, worker: usize) {
        while let Some(request) = self.frontier.pop().await {
            // Dropped at the end of this iteration, after every push
            let _done = DoneGuard::new(&self.frontier);
            debug!(
                worker,
                queued = self.frontier.queued(),
                outstanding = self.frontier.outstanding(),
                "Requesting {}",
                request
            );
            self.process(request).await;
        }
        debug!(worker, "Worker finished");
    }

    async fn process(&self, request: FetchRequest) {
        self.requests.fetch_add(1, Ordering::Relaxed);

        // Fetch the batch; a failure sends the request straight back
        let results = match self.source.fetch_batch(&request).await {
            Ok(results) => results,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Request for {} failed with error \"{}\"; returning it to the queue",
                    request, e
                );
                self.frontier.push(request);
                return;
            }
        };

        // Store what is new
        let expansion = expand::decode(request.kind, results, &self.store);
        if expansion.skipped > 0 {
            debug!("{} unusable result(s) in {}", expansion.skipped, request);
        }
        for entity in expansion.entities {
            self.record(entity);
        }

        // Partner lookups stop here; everything else keeps walking the graph
        if !request.expand {
            return;
        }
        for batch in FetchRequest::batches(request.kind.opposite(), &expansion.next, self.max_ids) {
            self.frontier.push(batch);
        }
    }

    fn record(&self, entity: Entity) {
        let name = match &entity {
            Entity::Person(person) => Some(person.label()),
            Entity::Union(_) => None,
        };

        // Another worker may have stored it first; then nothing is logged
        if let Some(count) = self.store.insert_counted(entity) {
            match name {
                Some(name) => info!("Added profile #{}: {}", count, name),
                None => info!("Added union #{}", count),
            }
        }
    }

    /// Ids an earlier run referenced but never fetched, as (unions, persons)
    ///
    /// Both are empty for a fresh store. The seed is left out; it is always
    /// pushed on its own.
    fn unfinished(&self, seed: EntityId) -> (Vec<EntityId>, Vec<EntityId>) {
        let unions = self.store.unions();

        // Persons whose own unions the crawl follows
        let mut expanded: BTreeSet<EntityId> = unions
            .iter()
            .flat_map(|union| union.biological_children().copied())
            .collect();
        expanded.insert(seed);

        let missing_unions: BTreeSet<EntityId> = self
            .store
            .persons()
            .iter()
            .filter(|person| expanded.contains(&person.id))
            .flat_map(|person| person.unions.iter().copied())
            .filter(|union| !self.store.contains(*union))
            .collect();

        let missing_persons: BTreeSet<EntityId> = expanded
            .into_iter()
            .filter(|person| *person != seed && !self.store.contains(*person))
            .collect();

        (
            missing_unions.into_iter().collect(),
            missing_persons.into_iter().collect(),
        )
    }

    /// Partners of stored unions that are not stored themselves
    fn missing_partners(&self) -> Vec<EntityId> {
        let missing: BTreeSet<EntityId> = self
            .store
            .unions()
            .iter()
            .flat_map(|union| union.partners.iter().copied())
            .filter(|partner| !self.store.contains(*partner))
            .collect();
        missing.into_iter().collect()
    }

    fn summary(&self, elapsed: Duration) -> CrawlSummary {
        CrawlSummary {
            persons: self.store.count(EntityKind::Person),
            unions: self.store.count(EntityKind::Union),
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{normalize_results, FetchError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tokio::time::timeout;

    const API: &str = "https://www.geni.com/api";

    fn person_refs(nums: &[u64]) -> Vec<String> {
        nums.iter().map(|n| format!("{}/profile-{}", API, n)).collect()
    }

    fn union_refs(nums: &[u64]) -> Vec<String> {
        nums.iter().map(|n| format!("{}/union-{}", API, n)).collect()
    }

    /// In-memory stand-in for the Geni API
    #[derive(Default)]
    struct FakeApi {
        entities: HashMap<EntityId, Value>,
        failures: Mutex<HashMap<EntityId, u32>>,
        panics_on: Option<EntityId>,
        calls: Mutex<Vec<FetchRequest>>,
    }

    impl FakeApi {
        fn person(mut self, num: u64, unions: &[u64]) -> Self {
            self.entities.insert(
                EntityId::person(num),
                json!({
                    "id": format!("profile-{}", num),
                    "name": format!("P{}", num),
                    "public": true,
                    "unions": union_refs(unions),
                }),
            );
            self
        }

        fn union(mut self, num: u64, partners: &[u64], children: &[u64], adopted: &[u64]) -> Self {
            self.entities.insert(
                EntityId::union(num),
                json!({
                    "id": format!("union-{}", num),
                    "partners": person_refs(partners),
                    "children": person_refs(children),
                    "adopted_children": person_refs(adopted),
                }),
            );
            self
        }

        fn raw(mut self, id: EntityId, value: Value) -> Self {
            self.entities.insert(id, value);
            self
        }

        /// The first `times` requests whose first id is `id` fail
        fn failing(self, id: EntityId, times: u32) -> Self {
            self.failures.lock().insert(id, times);
            self
        }

        /// Any request containing `id` panics
        fn panicking(mut self, id: EntityId) -> Self {
            self.panics_on = Some(id);
            self
        }

        /// Decodes the entity this fake would serve for `id`
        fn entity(&self, id: EntityId) -> Entity {
            Entity::decode(id.kind, self.entities[&id].clone()).unwrap()
        }

        fn calls_for(&self, id: EntityId) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|request| request.ids.contains(&id))
                .count()
        }
    }

    #[async_trait]
    impl EntitySource for FakeApi {
        async fn fetch_batch(&self, request: &FetchRequest) -> Result<Vec<Value>, FetchError> {
            self.calls.lock().push(request.clone());
            tokio::task::yield_now().await;

            if let Some(id) = self.panics_on {
                if request.ids.contains(&id) {
                    panic!("no handler for {}", id);
                }
            }

            {
                let mut failures = self.failures.lock();
                if let Some(left) = failures.get_mut(&request.ids[0]) {
                    if *left > 0 {
                        *left -= 1;
                        return Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE));
                    }
                }
            }

            let found: Vec<Value> = request
                .ids
                .iter()
                .filter_map(|id| self.entities.get(id).cloned())
                .collect();

            // Mirror the two response shapes of the real API
            let body = if request.ids.len() == 1 {
                found.into_iter().next().unwrap_or_else(|| json!({}))
            } else {
                json!({ "results": found })
            };
            normalize_results(body).ok_or(FetchError::Body)
        }
    }

    async fn crawl_into(
        api: Arc<FakeApi>,
        store: Arc<EntityStore>,
        seed: EntityId,
        workers: usize,
        fetch_partners: bool,
    ) -> Result<CrawlSummary> {
        let config = CrawlConfig {
            workers,
            max_ids: 2,
            fetch_partners,
            ..CrawlConfig::default()
        };

        let crawler = Crawler::new(api, store, &config);
        timeout(Duration::from_secs(10), crawler.run(seed))
            .await
            .expect("crawl must finish")
    }

    async fn crawl(
        api: FakeApi,
        seed: EntityId,
        workers: usize,
        fetch_partners: bool,
    ) -> (Arc<EntityStore>, Arc<FakeApi>, CrawlSummary) {
        let api = Arc::new(api);
        let store = Arc::new(EntityStore::in_memory());
        let summary = crawl_into(api.clone(), Arc::clone(&store), seed, workers, fetch_partners)
            .await
            .unwrap();
        (store, api, summary)
    }

    fn stored(store: &EntityStore, kind: EntityKind) -> Vec<u64> {
        match kind {
            EntityKind::Person => store.persons().iter().map(|p| p.id.num).collect(),
            EntityKind::Union => store.unions().iter().map(|u| u.id.num).collect(),
        }
    }

    fn single_union_family() -> FakeApi {
        // P1 and P2 form U1, whose only child is P3
        FakeApi::default()
            .person(1, &[1])
            .person(2, &[1])
            .person(3, &[1])
            .union(1, &[1, 2], &[3], &[])
    }

    #[tokio::test]
    async fn test_single_union_scenario() {
        let (store, api, summary) =
            crawl(single_union_family(), EntityId::person(1), 1, true).await;

        assert_eq!(stored(&store, EntityKind::Person), vec![1, 2, 3]);
        assert_eq!(stored(&store, EntityKind::Union), vec![1]);
        assert_eq!(summary.persons, 3);
        assert_eq!(summary.unions, 1);
        assert_eq!(summary.failures, 0);
        // Every entity fetched exactly once
        for id in [EntityId::person(1), EntityId::person(2), EntityId::person(3), EntityId::union(1)] {
            assert_eq!(api.calls_for(id), 1, "{} fetched more than once", id);
        }
    }

    #[tokio::test]
    async fn test_children_only_crawl_skips_partners() {
        let (store, api, _) = crawl(single_union_family(), EntityId::person(1), 1, false).await;

        assert_eq!(stored(&store, EntityKind::Person), vec![1, 3]);
        assert_eq!(api.calls_for(EntityId::person(2)), 0);
    }

    fn dynasty() -> FakeApi {
        // U0: parents P10, P11 with children P1, P2, P3 (the seed is P1)
        // U1: P1 + P20 with children P4 and adopted P5
        // U3: P3 + P30 with child P6
        // U4: P4 + P40 with child P7
        FakeApi::default()
            .person(10, &[0])
            .person(11, &[0])
            .person(1, &[0, 1])
            .person(2, &[0])
            .person(3, &[0, 3])
            .person(20, &[1])
            .person(4, &[1, 4])
            .person(5, &[1])
            .person(30, &[3])
            .person(6, &[3])
            .person(40, &[4])
            .person(7, &[4])
            .union(0, &[10, 11], &[1, 2, 3], &[])
            .union(1, &[1, 20], &[4, 5], &[5])
            .union(3, &[3, 30], &[6], &[])
            .union(4, &[4, 40], &[7], &[])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reaches_descendants_and_siblings_lines() {
        let (store, _, _) = crawl(dynasty(), EntityId::person(1), 4, false).await;

        // Siblings P2, P3 via the parents' union; nephew P6 via P3's union;
        // child P4 and grandchild P7 via the seed's own line. Adopted P5 is
        // recorded on U1 but not fetched.
        assert_eq!(stored(&store, EntityKind::Person), vec![1, 2, 3, 4, 6, 7]);
        assert_eq!(stored(&store, EntityKind::Union), vec![0, 1, 3, 4]);
        assert_eq!(store.union(1).unwrap().adopted_children, vec![EntityId::person(5)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_partner_completion_adds_partners_only() {
        let (store, api, _) = crawl(dynasty(), EntityId::person(1), 4, true).await;

        assert_eq!(
            stored(&store, EntityKind::Person),
            vec![1, 2, 3, 4, 6, 7, 10, 11, 20, 30, 40]
        );
        // Partners are not expanded, so no new unions and no adopted child
        assert_eq!(stored(&store, EntityKind::Union), vec![0, 1, 3, 4]);
        assert_eq!(api.calls_for(EntityId::person(5)), 0);
    }

    #[tokio::test]
    async fn test_failed_request_is_retried_until_it_succeeds() {
        let api = single_union_family().failing(EntityId::union(1), 3);
        let (store, api, summary) = crawl(api, EntityId::person(1), 2, false).await;

        assert_eq!(stored(&store, EntityKind::Person), vec![1, 3]);
        assert_eq!(stored(&store, EntityKind::Union), vec![1]);
        // Three failures plus the one success, and nothing after it
        assert_eq!(api.calls_for(EntityId::union(1)), 4);
        assert_eq!(summary.failures, 3);
    }

    #[tokio::test]
    async fn test_malformed_results_do_not_stop_the_crawl() {
        let api = FakeApi::default()
            .person(1, &[1])
            .union(1, &[1], &[2, 3], &[])
            .raw(EntityId::person(2), json!({ "name": "no id here" }))
            .person(3, &[1]);

        let (store, _, _) = crawl(api, EntityId::person(1), 2, false).await;
        assert_eq!(stored(&store, EntityKind::Person), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_unknown_seed_finishes_empty() {
        let (store, api, summary) =
            crawl(FakeApi::default(), EntityId::person(404), 3, true).await;
        assert_eq!(store.count(EntityKind::Person), 0);
        assert_eq!(api.calls_for(EntityId::person(404)), 1);
        assert_eq!(summary.requests, 1);
    }

    #[tokio::test]
    async fn test_requests_respect_batch_size() {
        // One union with five children: max_ids = 2 gives batches of 2, 2, 1
        let api = FakeApi::default()
            .person(1, &[1])
            .union(1, &[1], &[2, 3, 4, 5, 6], &[])
            .person(2, &[1])
            .person(3, &[1])
            .person(4, &[1])
            .person(5, &[1])
            .person(6, &[1]);

        let (store, api, _) = crawl(api, EntityId::person(1), 1, false).await;
        assert_eq!(store.count(EntityKind::Person), 6);

        let child_batches: Vec<usize> = api
            .calls
            .lock()
            .iter()
            .filter(|r| r.kind == EntityKind::Person && !r.ids.contains(&EntityId::person(1)))
            .map(|r| r.ids.len())
            .collect();
        assert_eq!(child_batches, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_rerun_finishes_a_partial_store() {
        // An earlier run stored P1 and U1 but stopped before fetching P3
        let api = Arc::new(single_union_family());
        let store = Arc::new(EntityStore::in_memory());
        store.insert_counted(api.entity(EntityId::person(1)));
        store.insert_counted(api.entity(EntityId::union(1)));

        crawl_into(api.clone(), Arc::clone(&store), EntityId::person(1), 1, false)
            .await
            .unwrap();

        assert_eq!(stored(&store, EntityKind::Person), vec![1, 3]);
        assert_eq!(api.calls_for(EntityId::person(3)), 1);
        // Stored entities are not fetched again, apart from the seed
        assert_eq!(api.calls_for(EntityId::union(1)), 0);
        assert_eq!(api.calls_for(EntityId::person(1)), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rerun_picks_up_missing_unions_of_reached_people() {
        // The seed line reached P4 but never fetched P4's union U4
        let api = Arc::new(dynasty());
        let store = Arc::new(EntityStore::in_memory());
        for id in [
            EntityId::person(1),
            EntityId::union(0),
            EntityId::union(1),
            EntityId::person(4),
            EntityId::person(20),
        ] {
            store.insert_counted(api.entity(id));
        }

        crawl_into(api.clone(), Arc::clone(&store), EntityId::person(1), 4, false)
            .await
            .unwrap();

        assert_eq!(stored(&store, EntityKind::Person), vec![1, 2, 3, 4, 6, 7, 20]);
        assert_eq!(stored(&store, EntityKind::Union), vec![0, 1, 3, 4]);
        // P20 married in; a rerun does not start walking their family
        assert_eq!(api.calls_for(EntityId::person(20)), 0);
    }

    #[tokio::test]
    async fn test_fresh_store_has_nothing_unfinished() {
        let store = Arc::new(EntityStore::in_memory());
        let crawler = Crawler::new(
            Arc::new(FakeApi::default()),
            store,
            &CrawlConfig::default(),
        );
        let (unions, persons) = crawler.unfinished(EntityId::person(1));
        assert!(unions.is_empty());
        assert!(persons.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_worker_fails_the_crawl() {
        let api = Arc::new(single_union_family().panicking(EntityId::union(1)));
        let store = Arc::new(EntityStore::in_memory());

        let err = crawl_into(api, Arc::clone(&store), EntityId::person(1), 1, false)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("panicked"), "{:#}", err);
        // What was stored before the panic is kept
        assert_eq!(stored(&store, EntityKind::Person), vec![1]);
    }
}
