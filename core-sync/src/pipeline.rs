//! # Derived Resolution Pipeline
//!
//! Resolves one derived artifact per item, one item at a time.
//!
//! ## Guarantees
//!
//! - Completion events follow input order: item `n` settles before item
//!   `n + 1` starts.
//! - At most one resolver call is in flight per item id. A request for an id
//!   that is already being resolved attaches to the existing call.
//! - A failing item is logged and skipped; the rest of the run continues.
//! - `resolve` cancels the previous run, and cancelling the parent token
//!   (engine disposal) cancels every run. A cancelled run emits nothing more.
//!
//! ## Worker
//!
//! ```text
//! resolve(items) ──> cancel previous run ──> spawn worker(queue)
//!
//! worker: pop item ─┬─ memo hit ────────────────────────────> emit
//!                   └─ attach/create shared future ─┬─ Ok ──> memoize, emit
//!                                                   └─ Err ─> warn, next
//! ```

use crate::error::SyncError;
use crate::events::RepositoryEvent;
use crate::fetcher::Resolver;
use core_async::sync::CancellationToken;
use core_async::task::JoinHandle;
use core_cache::Identifiable;
use core_runtime::events::EventBus;
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, warn};

type InFlight<D> = Shared<BoxFuture<'static, Result<D, Arc<SyncError>>>>;

/// Sequential, deduplicating resolver of derived artifacts.
///
/// Cloning yields another handle to the same pipeline.
pub struct DerivedResolutionPipeline<I, D> {
    inner: Arc<PipelineInner<I, D>>,
}

impl<I, D> Clone for DerivedResolutionPipeline<I, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PipelineInner<I, D> {
    resolver: Arc<dyn Resolver<I, D>>,
    events: EventBus<RepositoryEvent<I, D>>,
    memo: Mutex<LruCache<String, D>>,
    in_flight: Mutex<HashMap<String, InFlight<D>>>,
    current_run: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl<I, D> DerivedResolutionPipeline<I, D>
where
    I: Identifiable + Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    /// Creates a pipeline that publishes completions on `events`.
    ///
    /// Cancelling `shutdown` stops every current and future run.
    pub fn new(
        resolver: Arc<dyn Resolver<I, D>>,
        events: EventBus<RepositoryEvent<I, D>>,
        memo_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let capacity = NonZeroUsize::new(memo_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(PipelineInner {
                resolver,
                events,
                memo: Mutex::new(LruCache::new(capacity)),
                in_flight: Mutex::new(HashMap::new()),
                current_run: Mutex::new(None),
                shutdown,
            }),
        }
    }

    /// Cancels the running resolution, if any, and starts a new one over
    /// `items`.
    ///
    /// The returned handle completes when the run finishes or is cancelled.
    pub fn resolve(&self, items: Vec<I>) -> JoinHandle<()> {
        let token = self.inner.shutdown.child_token();
        if let Some(previous) = self.inner.current_run.lock().replace(token.clone()) {
            previous.cancel();
        }

        {
            let wanted: HashSet<&str> = items.iter().map(|item| item.id()).collect();
            self.inner
                .in_flight
                .lock()
                .retain(|id, _| wanted.contains(id.as_str()));
        }

        debug!(count = items.len(), "Starting derived resolution run");
        let inner = Arc::clone(&self.inner);
        core_async::task::spawn(async move { inner.run(items.into(), token).await })
    }

    /// Drops the memoized artifact and any in-flight call for `id`, so the
    /// next run resolves it again.
    pub fn forget(&self, id: &str) {
        self.inner.memo.lock().pop(id);
        self.inner.in_flight.lock().remove(id);
    }

    /// Memoized artifact for `id`, if one was resolved before.
    pub fn cached(&self, id: &str) -> Option<D> {
        self.inner.memo.lock().peek(id).cloned()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }
}

impl<I, D> PipelineInner<I, D>
where
    I: Identifiable + Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    async fn run(&self, mut queue: VecDeque<I>, token: CancellationToken) {
        while let Some(item) = queue.pop_front() {
            if token.is_cancelled() {
                debug!(remaining = queue.len() + 1, "Derived resolution run cancelled");
                return;
            }

            let id = item.id().to_string();

            let memoized = self.memo.lock().get(&id).cloned();
            if let Some(artifact) = memoized {
                debug!(item_id = %id, "Derived artifact memo hit");
                self.emit(&token, item, artifact);
                continue;
            }

            let shared = self
                .in_flight
                .lock()
                .entry(id.clone())
                .or_insert_with(|| self.start(item.clone()))
                .clone();

            let outcome = core_async::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(item_id = %id, "Derived resolution run cancelled mid-item");
                    return;
                }
                outcome = shared.clone() => outcome,
            };

            {
                let mut in_flight = self.in_flight.lock();
                if in_flight
                    .get(&id)
                    .map_or(false, |current| current.ptr_eq(&shared))
                {
                    in_flight.remove(&id);
                }
            }

            match outcome {
                Ok(artifact) => {
                    self.memo.lock().put(id, artifact.clone());
                    self.emit(&token, item, artifact);
                }
                Err(e) => {
                    warn!(item_id = %id, error = %e, "Derived resolution failed, skipping item");
                }
            }
        }
    }

    fn start(&self, item: I) -> InFlight<D> {
        let resolver = Arc::clone(&self.resolver);
        async move { resolver.resolve(&item).await.map_err(Arc::new) }
            .boxed()
            .shared()
    }

    fn emit(&self, token: &CancellationToken, item: I, artifact: D) {
        if token.is_cancelled() {
            return;
        }
        self.events
            .publish(RepositoryEvent::CompleteLoadingDerived { item, artifact });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use core_async::sync::Notify;
    use core_runtime::events::EventStream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Item(String);

    impl Identifiable for Item {
        fn id(&self) -> &str {
            &self.0
        }
    }

    fn item(id: &str) -> Item {
        Item(id.to_string())
    }

    /// Resolves `id` to `"derived-{id}"`, failing for ids listed in `fail`.
    /// When `gate` is set, every call waits on it before returning.
    #[derive(Default)]
    struct CountingResolver {
        calls: Mutex<Vec<String>>,
        total: AtomicUsize,
        fail: HashSet<String>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl Resolver<Item, String> for CountingResolver {
        async fn resolve(&self, item: &Item) -> Result<String> {
            self.calls.lock().push(item.0.clone());
            self.total.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail.contains(&item.0) {
                return Err(SyncError::Resolution {
                    item_id: item.0.clone(),
                    message: "no playable links".into(),
                });
            }
            Ok(format!("derived-{}", item.0))
        }
    }

    fn pipeline(
        resolver: Arc<CountingResolver>,
    ) -> (
        DerivedResolutionPipeline<Item, String>,
        EventStream<RepositoryEvent<Item, String>>,
    ) {
        let bus = EventBus::new(64);
        let stream = EventStream::new(bus.subscribe());
        let pipeline = DerivedResolutionPipeline::new(resolver, bus, 16, CancellationToken::new());
        (pipeline, stream)
    }

    fn derived_ids(events: Vec<RepositoryEvent<Item, String>>) -> Vec<String> {
        events
            .into_iter()
            .filter_map(|event| match event {
                RepositoryEvent::CompleteLoadingDerived { item, artifact } => {
                    assert_eq!(artifact, format!("derived-{}", item.0));
                    Some(item.0)
                }
                _ => None,
            })
            .collect()
    }

    #[core_async::test]
    async fn test_emits_in_input_order() {
        let resolver = Arc::new(CountingResolver::default());
        let (pipeline, mut stream) = pipeline(resolver.clone());

        pipeline
            .resolve(vec![item("a"), item("b"), item("c")])
            .await
            .unwrap();

        assert_eq!(derived_ids(stream.drain()), vec!["a", "b", "c"]);
        assert_eq!(*resolver.calls.lock(), vec!["a", "b", "c"]);
    }

    #[core_async::test]
    async fn test_duplicate_ids_resolve_once() {
        let resolver = Arc::new(CountingResolver::default());
        let (pipeline, mut stream) = pipeline(resolver.clone());

        pipeline.resolve(vec![item("a"), item("a")]).await.unwrap();

        assert_eq!(resolver.total.load(Ordering::SeqCst), 1);
        // second occurrence is served from the memo
        assert_eq!(derived_ids(stream.drain()), vec!["a", "a"]);
    }

    #[core_async::test]
    async fn test_overlapping_runs_share_in_flight_call() {
        let gate = Arc::new(Notify::new());
        let resolver = Arc::new(CountingResolver {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let (pipeline, mut stream) = pipeline(resolver.clone());

        let first = pipeline.resolve(vec![item("a")]);
        // let the first run start the resolver call and park on the gate
        while resolver.total.load(Ordering::SeqCst) == 0 {
            core_async::task::yield_now().await;
        }

        let second = pipeline.resolve(vec![item("a"), item("b")]);
        first.await.unwrap();
        assert_eq!(pipeline.in_flight_count(), 1);

        // release "a", then "b"
        gate.notify_one();
        while resolver.total.load(Ordering::SeqCst) < 2 {
            core_async::task::yield_now().await;
        }
        gate.notify_one();
        second.await.unwrap();

        assert_eq!(*resolver.calls.lock(), vec!["a", "b"]);
        assert_eq!(derived_ids(stream.drain()), vec!["a", "b"]);
        assert_eq!(pipeline.in_flight_count(), 0);
    }

    #[core_async::test]
    async fn test_failure_is_isolated() {
        let resolver = Arc::new(CountingResolver {
            fail: HashSet::from(["b".to_string()]),
            ..Default::default()
        });
        let (pipeline, mut stream) = pipeline(resolver.clone());

        pipeline
            .resolve(vec![item("a"), item("b"), item("c")])
            .await
            .unwrap();

        assert_eq!(derived_ids(stream.drain()), vec!["a", "c"]);
        assert!(pipeline.cached("b").is_none());
        assert_eq!(pipeline.cached("c").as_deref(), Some("derived-c"));
    }

    #[core_async::test]
    async fn test_failed_item_is_retried_on_next_run() {
        let resolver = Arc::new(CountingResolver {
            fail: HashSet::from(["a".to_string()]),
            ..Default::default()
        });
        let (pipeline, _stream) = pipeline(resolver.clone());

        pipeline.resolve(vec![item("a")]).await.unwrap();
        pipeline.resolve(vec![item("a")]).await.unwrap();

        assert_eq!(resolver.total.load(Ordering::SeqCst), 2);
    }

    #[core_async::test]
    async fn test_forget_resolves_item_again() {
        let resolver = Arc::new(CountingResolver::default());
        let (pipeline, _stream) = pipeline(resolver.clone());

        pipeline.resolve(vec![item("a")]).await.unwrap();
        pipeline.forget("a");
        assert!(pipeline.cached("a").is_none());

        pipeline.resolve(vec![item("a")]).await.unwrap();
        assert_eq!(resolver.total.load(Ordering::SeqCst), 2);
        assert_eq!(pipeline.cached("a").as_deref(), Some("derived-a"));
    }

    #[core_async::test]
    async fn test_shutdown_stops_run_without_events() {
        let gate = Arc::new(Notify::new());
        let resolver = Arc::new(CountingResolver {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let bus = EventBus::new(16);
        let mut stream = EventStream::new(bus.subscribe());
        let shutdown = CancellationToken::new();
        let pipeline = DerivedResolutionPipeline::new(resolver.clone(), bus, 16, shutdown.clone());

        let run = pipeline.resolve(vec![item("a"), item("b")]);
        while resolver.total.load(Ordering::SeqCst) == 0 {
            core_async::task::yield_now().await;
        }

        shutdown.cancel();
        gate.notify_one();
        run.await.unwrap();

        assert!(stream.drain().is_empty());
        assert_eq!(resolver.total.load(Ordering::SeqCst), 1);
    }

    #[core_async::test]
    async fn test_resolve_prunes_unrequested_in_flight_entries() {
        let gate = Arc::new(Notify::new());
        let resolver = Arc::new(CountingResolver {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let (pipeline, _stream) = pipeline(resolver.clone());

        let first = pipeline.resolve(vec![item("a")]);
        while resolver.total.load(Ordering::SeqCst) == 0 {
            core_async::task::yield_now().await;
        }
        assert_eq!(pipeline.in_flight_count(), 1);

        let second = pipeline.resolve(vec![]);
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(pipeline.in_flight_count(), 0);
    }
}
