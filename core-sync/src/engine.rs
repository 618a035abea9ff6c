//! # Paginated Sync Engine
//!
//! Reconciles one paginated remote stream with its offline copy and exposes a
//! single item list plus an ordered event channel.
//!
//! ## Commands
//!
//! - [`fetch_cache_items`](PaginatedSyncEngine::fetch_cache_items): load the
//!   offline copy. Always ends in `CacheOnly`, even on a miss.
//! - [`fetch_next`](PaginatedSyncEngine::fetch_next): append the next forward
//!   page.
//! - [`fetch_latest`](PaginatedSyncEngine::fetch_latest): prepend items newer
//!   than the watermark.
//! - [`dispose`](PaginatedSyncEngine::dispose): cancel everything in flight.
//!
//! A command issued while another request is outstanding, or one that has
//! nothing to do, returns [`FetchOutcome::Skipped`] without emitting events.
//!
//! ## Ordering
//!
//! On success a command mutates the list, writes through to the cache, hands
//! the list to the derived pipeline, emits its completion event and only then
//! moves the lifecycle out of its fetching state.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = PaginatedSyncEngine::new(stream_id, fetcher, cache, filters);
//! let mut events = engine.subscribe();
//!
//! engine.fetch_cache_items().await;
//! render(engine.get_items());
//!
//! engine.fetch_next().await;
//! render(engine.get_items());
//! ```

use crate::events::{ItemChange, RepositoryEvent};
use crate::fetcher::{PageFetcher, Resolver};
use crate::lifecycle::{FetchOutcome, LifecycleState};
use crate::pagination::{
    DefaultParamsBuilder, Page, PaginationParams, PaginationParamsBuilder, StreamFilters,
};
use crate::pipeline::DerivedResolutionPipeline;
use bridge_traits::time::{Clock, SystemClock};
use core_async::sync::broadcast::error::RecvError;
use core_async::sync::CancellationToken;
use core_cache::{Identifiable, ListHandle, TtlCache};
use core_runtime::config::DEFAULT_DERIVED_MEMO_CAPACITY;
use core_runtime::events::{EventBus, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
use core_runtime::logging::redact_stream_id;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};

/// Bounds every engine item type satisfies.
pub trait SyncItem:
    Identifiable + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> SyncItem for T where
    T: Identifiable + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

// ============================================================================
// State
// ============================================================================

struct EngineState<I> {
    items: Arc<Vec<I>>,
    cache_items: Arc<Vec<I>>,
    continuation: Option<String>,
    last_updated: Option<i64>,
    lifecycle: LifecycleState,
    /// Set by the first successful network fetch
    network_loaded: bool,
}

impl<I> Default for EngineState<I> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            cache_items: Arc::new(Vec::new()),
            continuation: None,
            last_updated: None,
            lifecycle: LifecycleState::Init,
            network_loaded: false,
        }
    }
}

impl<I: Clone> EngineState<I> {
    fn serving_cache(&self) -> bool {
        self.lifecycle.is_cache_mode() || !self.network_loaded
    }

    fn visible(&self) -> &Arc<Vec<I>> {
        if self.serving_cache() {
            &self.cache_items
        } else {
            &self.items
        }
    }

    /// Lifecycle after a successful network request.
    fn settled(&self) -> LifecycleState {
        if self.continuation.is_some() {
            LifecycleState::Normal
        } else {
            LifecycleState::Complete
        }
    }
}

/// Replaces or removes the element with `id`, returning its index.
fn apply_to_list<I: Identifiable + Clone>(
    list: &mut Arc<Vec<I>>,
    change: &ItemChange<I>,
) -> Option<usize> {
    let id = match change {
        ItemChange::Updated(item) => item.id(),
        ItemChange::Removed(id) => id.as_str(),
    };
    let index = list.iter().position(|existing| existing.id() == id)?;

    let mut next = (**list).clone();
    match change {
        ItemChange::Updated(item) => next[index] = item.clone(),
        ItemChange::Removed(_) => {
            next.remove(index);
        }
    }
    *list = Arc::new(next);
    Some(index)
}

// ============================================================================
// Engine
// ============================================================================

struct EngineInner<I, D> {
    stream_id: String,
    cache_key: String,
    filters: StreamFilters,
    fetcher: Arc<dyn PageFetcher<I>>,
    params: Arc<dyn PaginationParamsBuilder>,
    cache: Option<TtlCache<I>>,
    clock: Arc<dyn Clock>,
    pipeline: Option<DerivedResolutionPipeline<I, D>>,
    changes: Option<EventBus<ItemChange<I>>>,
    events: EventBus<RepositoryEvent<I, D>>,
    state: Mutex<EngineState<I>>,
    shutdown: CancellationToken,
}

impl<I, D> Drop for EngineInner<I, D> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Handle to a paginated stream. Clones share the same engine.
///
/// `D` is the derived artifact type; engines without a resolver use `()`.
pub struct PaginatedSyncEngine<I, D = ()> {
    inner: Arc<EngineInner<I, D>>,
}

impl<I, D> Clone for PaginatedSyncEngine<I, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, D> std::fmt::Debug for PaginatedSyncEngine<I, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginatedSyncEngine")
            .field("stream_id", &redact_stream_id(&self.inner.stream_id))
            .field("lifecycle", &self.inner.state.lock().lifecycle)
            .finish()
    }
}

/// Non-owning handle to an engine, for registries that must not keep the
/// engine (and its fetcher and resolver) alive.
pub struct WeakSyncEngine<I, D = ()> {
    inner: Weak<EngineInner<I, D>>,
}

impl<I, D> Clone for WeakSyncEngine<I, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<I, D> WeakSyncEngine<I, D> {
    /// The engine, if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<PaginatedSyncEngine<I, D>> {
        self.inner
            .upgrade()
            .map(|inner| PaginatedSyncEngine { inner })
    }
}

impl<I, D> PaginatedSyncEngine<I, D> {
    pub fn downgrade(&self) -> WeakSyncEngine<I, D> {
        WeakSyncEngine {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<I, D> PaginatedSyncEngine<I, D>
where
    I: SyncItem,
    D: Clone + Send + Sync + 'static,
{
    /// Engine with the default params builder and no optional collaborators.
    pub fn new(
        stream_id: impl Into<String>,
        fetcher: Arc<dyn PageFetcher<I>>,
        cache: TtlCache<I>,
        filters: StreamFilters,
    ) -> Self {
        SyncEngineBuilder::new(stream_id, fetcher)
            .cache(cache)
            .filters(filters)
            .build()
    }

    pub fn builder(
        stream_id: impl Into<String>,
        fetcher: Arc<dyn PageFetcher<I>>,
    ) -> SyncEngineBuilder<I, D> {
        SyncEngineBuilder::new(stream_id, fetcher)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Snapshot of the current item list.
    ///
    /// Serves the offline copy until the first network fetch succeeds, then
    /// network items only.
    pub fn get_items(&self) -> Arc<Vec<I>> {
        Arc::clone(self.inner.state.lock().visible())
    }

    pub fn current_state(&self) -> LifecycleState {
        self.inner.state.lock().lifecycle
    }

    pub fn last_updated(&self) -> Option<i64> {
        self.inner.state.lock().last_updated
    }

    pub fn continuation(&self) -> Option<String> {
        self.inner.state.lock().continuation.clone()
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    pub fn cache_key(&self) -> &str {
        &self.inner.cache_key
    }

    pub fn filters(&self) -> StreamFilters {
        self.inner.filters
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// New subscriber to this engine's events. Past events are not replayed.
    pub fn subscribe(&self) -> EventStream<RepositoryEvent<I, D>> {
        EventStream::new(self.inner.events.subscribe())
    }

    pub fn pipeline(&self) -> Option<&DerivedResolutionPipeline<I, D>> {
        self.inner.pipeline.as_ref()
    }

    /// Announces a change on the shared change bus. Every engine on the bus,
    /// this one included, applies it. Returns `false` without a bus.
    pub fn publish_change(&self, change: ItemChange<I>) -> bool {
        match &self.inner.changes {
            Some(bus) => {
                bus.publish(change);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Loads the offline copy. A miss or storage failure yields an empty list.
    #[instrument(skip(self), fields(stream_id = %redact_stream_id(&self.inner.stream_id)))]
    pub async fn fetch_cache_items(&self) -> FetchOutcome {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            if inner.shutdown.is_cancelled()
                || !matches!(
                    state.lifecycle,
                    LifecycleState::Init | LifecycleState::CacheOnly
                )
            {
                debug!(lifecycle = %state.lifecycle, "Skipping cache fetch");
                return FetchOutcome::Skipped;
            }
            state.lifecycle = LifecycleState::FetchingCache;
        }

        inner.events.publish(RepositoryEvent::StartLoadingCache);

        let items = core_async::select! {
            biased;
            _ = inner.shutdown.cancelled() => return FetchOutcome::Cancelled,
            items = inner.read_cache() => items,
        };

        let snapshot = Arc::new(items);
        inner.state.lock().cache_items = Arc::clone(&snapshot);
        inner.items_updated(&snapshot);

        inner.events.publish(RepositoryEvent::CompleteLoadingCache);
        inner.state.lock().lifecycle = LifecycleState::CacheOnly;

        info!(count = snapshot.len(), "Loaded offline items");
        FetchOutcome::Applied
    }

    /// Appends the next forward page.
    #[instrument(skip(self), fields(stream_id = %redact_stream_id(&self.inner.stream_id)))]
    pub async fn fetch_next(&self) -> FetchOutcome {
        let inner = &self.inner;
        let params = {
            let mut state = inner.state.lock();
            let exhausted = state.lifecycle == LifecycleState::Complete
                || (state.network_loaded && state.continuation.is_none());

            if inner.shutdown.is_cancelled() || state.lifecycle.is_fetching() || exhausted {
                debug!(lifecycle = %state.lifecycle, exhausted, "Skipping next page fetch");
                return FetchOutcome::Skipped;
            }

            // A retry before any network success still serves the offline copy.
            let cache_mode = state.lifecycle == LifecycleState::CacheOnly
                || (state.lifecycle == LifecycleState::Error && !state.network_loaded);
            state.lifecycle = if cache_mode {
                LifecycleState::CacheOnlyFetching
            } else {
                LifecycleState::Fetching
            };
            inner
                .params
                .next_page(&inner.filters, state.continuation.as_deref())
        };

        inner.events.publish(RepositoryEvent::StartLoadingNext);

        let page = match inner.fetch(&params).await {
            Some(Ok(page)) => page,
            Some(Err(e)) => {
                warn!(error = %e, "Failed to load next page");
                inner.events.publish(RepositoryEvent::FailToLoadNext {
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                });
                inner.state.lock().lifecycle = LifecycleState::Error;
                return FetchOutcome::Failed;
            }
            None => return FetchOutcome::Cancelled,
        };
        if page.is_last() {
            debug!(page_id = %page.id, "Reached end of stream");
        }

        let (first_page, snapshot) = {
            let mut state = inner.state.lock();
            let first_page = !state.network_loaded;

            let mut items = (*state.items).clone();
            items.extend(page.items.iter().cloned());
            state.items = Arc::new(items);
            state.continuation = page.continuation.clone();
            if state.last_updated.is_none() {
                state.last_updated = Some(page.updated.unwrap_or_else(|| inner.now()));
            }
            state.network_loaded = true;
            state.cache_items = Arc::new(Vec::new());

            (first_page, Arc::clone(&state.items))
        };

        if let Some(list) = inner.cache_list().await {
            let written = if first_page {
                list.replace(&page.items).await
            } else {
                list.add(&page.items).await
            };
            if let Err(e) = written {
                warn!(error = %e, "Failed to update offline copy");
            }
        }
        if inner.shutdown.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        inner.items_updated(&snapshot);
        inner.events.publish(RepositoryEvent::CompleteLoadingNext);

        let lifecycle = {
            let mut state = inner.state.lock();
            state.lifecycle = state.settled();
            state.lifecycle
        };

        info!(count = snapshot.len(), lifecycle = %lifecycle, "Loaded next page");
        FetchOutcome::Applied
    }

    /// Prepends items newer than the last-updated watermark.
    ///
    /// Skipped while there are no network items to reconcile against.
    #[instrument(skip(self), fields(stream_id = %redact_stream_id(&self.inner.stream_id)))]
    pub async fn fetch_latest(&self) -> FetchOutcome {
        let inner = &self.inner;
        let params = {
            let mut state = inner.state.lock();
            if inner.shutdown.is_cancelled()
                || state.lifecycle.is_fetching()
                || state.items.is_empty()
            {
                debug!(lifecycle = %state.lifecycle, "Skipping latest fetch");
                return FetchOutcome::Skipped;
            }

            state.lifecycle = LifecycleState::Fetching;
            inner.params.latest(&inner.filters, state.last_updated)
        };

        inner.events.publish(RepositoryEvent::StartLoadingLatest);

        let page = match inner.fetch(&params).await {
            Some(Ok(page)) => page,
            Some(Err(e)) => {
                warn!(error = %e, "Failed to load latest items");
                inner.events.publish(RepositoryEvent::FailToLoadLatest {
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                });
                inner.state.lock().lifecycle = LifecycleState::Error;
                return FetchOutcome::Failed;
            }
            None => return FetchOutcome::Cancelled,
        };

        let added = page.items.len();
        let snapshot = {
            let mut state = inner.state.lock();
            let mut items = page.items;
            items.extend(state.items.iter().cloned());
            state.items = Arc::new(items);
            state.last_updated = Some(inner.now());
            Arc::clone(&state.items)
        };

        if let Some(list) = inner.cache_list().await {
            if let Err(e) = list.replace(&snapshot).await {
                warn!(error = %e, "Failed to update offline copy");
            }
        }
        if inner.shutdown.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        inner.items_updated(&snapshot);
        inner.events.publish(RepositoryEvent::CompleteLoadingLatest);

        let lifecycle = {
            let mut state = inner.state.lock();
            state.lifecycle = state.settled();
            state.lifecycle
        };

        info!(added, lifecycle = %lifecycle, "Loaded latest items");
        FetchOutcome::Applied
    }

    /// Cancels any outstanding fetch and derived resolution. Later commands
    /// are skipped.
    pub fn dispose(&self) {
        if !self.inner.shutdown.is_cancelled() {
            debug!(stream_id = %redact_stream_id(&self.inner.stream_id), "Disposing engine");
        }
        self.inner.shutdown.cancel();
    }
}

impl<I, D> EngineInner<I, D>
where
    I: SyncItem,
    D: Clone + Send + Sync + 'static,
{
    fn now(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    /// Runs the page request; `None` when the engine was disposed meanwhile.
    async fn fetch(&self, params: &PaginationParams) -> Option<crate::Result<Page<I>>> {
        core_async::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            result = self.fetcher.fetch_page(&self.stream_id, params) => Some(result),
        }
    }

    async fn cache_list(&self) -> Option<ListHandle<I>> {
        match &self.cache {
            Some(cache) => Some(cache.list_get_or_create(&self.cache_key).await),
            None => None,
        }
    }

    async fn read_cache(&self) -> Vec<I> {
        let Some(list) = self.cache_list().await else {
            return Vec::new();
        };

        list.items().await.unwrap_or_else(|e| {
            warn!(error = %e, "Offline copy unavailable, continuing without it");
            Vec::new()
        })
    }

    /// Integration point for derived resolution; runs before the public event.
    fn items_updated(&self, items: &Arc<Vec<I>>) {
        if let Some(pipeline) = &self.pipeline {
            // Detached: the worker outlives this call and reports through events.
            drop(pipeline.resolve(items.as_ref().clone()));
        }
    }

    /// Applies a shared change to both lists. Changes to the visible list are
    /// written through and re-resolved like any other list mutation.
    async fn apply_change(&self, change: ItemChange<I>) {
        let (index, snapshot) = {
            let mut state = self.state.lock();
            let in_items = apply_to_list(&mut state.items, &change);
            let in_cache = apply_to_list(&mut state.cache_items, &change);

            let index = if state.serving_cache() { in_cache } else { in_items };
            (index, Arc::clone(state.visible()))
        };
        let Some(index) = index else {
            return;
        };

        if let Some(list) = self.cache_list().await {
            if let Err(e) = list.replace(&snapshot).await {
                warn!(error = %e, "Failed to update offline copy");
            }
        }
        if self.shutdown.is_cancelled() {
            return;
        }

        let event = match change {
            ItemChange::Updated(item) => {
                if let Some(pipeline) = &self.pipeline {
                    pipeline.forget(item.id());
                }
                RepositoryEvent::UpdatedAt(index)
            }
            ItemChange::Removed(_) => RepositoryEvent::RemovedAt(index),
        };
        self.items_updated(&snapshot);

        debug!(event = event.name(), "Applied shared item change");
        self.events.publish(event);
    }
}

/// Applies shared changes until the engine is dropped or disposed.
async fn listen_for_changes<I, D>(
    engine: Weak<EngineInner<I, D>>,
    mut changes: EventStream<ItemChange<I>>,
    shutdown: CancellationToken,
) where
    I: SyncItem,
    D: Clone + Send + Sync + 'static,
{
    loop {
        let received = core_async::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = changes.recv() => received,
        };

        match received {
            Ok(change) => {
                let Some(inner) = engine.upgrade() else {
                    break;
                };
                inner.apply_change(change).await;
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Change listener lagged; some shared changes were dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`PaginatedSyncEngine`] with optional collaborators.
pub struct SyncEngineBuilder<I, D = ()> {
    stream_id: String,
    fetcher: Arc<dyn PageFetcher<I>>,
    filters: StreamFilters,
    params: Arc<dyn PaginationParamsBuilder>,
    cache: Option<TtlCache<I>>,
    cache_key: Option<String>,
    clock: Arc<dyn Clock>,
    resolver: Option<Arc<dyn Resolver<I, D>>>,
    memo_capacity: usize,
    changes: Option<EventBus<ItemChange<I>>>,
    event_capacity: usize,
}

impl<I, D> SyncEngineBuilder<I, D>
where
    I: SyncItem,
    D: Clone + Send + Sync + 'static,
{
    pub fn new(stream_id: impl Into<String>, fetcher: Arc<dyn PageFetcher<I>>) -> Self {
        Self {
            stream_id: stream_id.into(),
            fetcher,
            filters: StreamFilters::default(),
            params: Arc::new(DefaultParamsBuilder),
            cache: None,
            cache_key: None,
            clock: Arc::new(SystemClock),
            resolver: None,
            memo_capacity: DEFAULT_DERIVED_MEMO_CAPACITY,
            changes: None,
            event_capacity: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }

    pub fn filters(mut self, filters: StreamFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn params_builder(mut self, params: Arc<dyn PaginationParamsBuilder>) -> Self {
        self.params = params;
        self
    }

    pub fn cache(mut self, cache: TtlCache<I>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Overrides the cache key, which defaults to the stream id plus the
    /// filter suffix.
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn Resolver<I, D>>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn memo_capacity(mut self, capacity: usize) -> Self {
        self.memo_capacity = capacity;
        self
    }

    /// Attaches the shared change bus.
    pub fn change_bus(mut self, bus: EventBus<ItemChange<I>>) -> Self {
        self.changes = Some(bus);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Builds the engine.
    ///
    /// # Panics
    ///
    /// With a change bus attached, the listener task is spawned here, so this
    /// must run inside the async runtime.
    pub fn build(self) -> PaginatedSyncEngine<I, D> {
        let shutdown = CancellationToken::new();
        let events = EventBus::new(self.event_capacity);
        let cache_key = self
            .cache_key
            .unwrap_or_else(|| format!("{}{}", self.stream_id, self.filters.cache_suffix()));

        let pipeline = self.resolver.map(|resolver| {
            DerivedResolutionPipeline::new(
                resolver,
                events.clone(),
                self.memo_capacity,
                shutdown.child_token(),
            )
        });

        // Subscribe before returning so no change published after build is missed.
        let change_stream = self
            .changes
            .as_ref()
            .map(|bus| EventStream::new(bus.subscribe()));

        let inner = Arc::new(EngineInner {
            stream_id: self.stream_id,
            cache_key,
            filters: self.filters,
            fetcher: self.fetcher,
            params: self.params,
            cache: self.cache,
            clock: self.clock,
            pipeline,
            changes: self.changes,
            events,
            state: Mutex::new(EngineState::default()),
            shutdown: shutdown.clone(),
        });

        if let Some(stream) = change_stream {
            core_async::task::spawn(listen_for_changes(
                Arc::downgrade(&inner),
                stream,
                shutdown,
            ));
        }

        debug!(
            stream_id = %redact_stream_id(&inner.stream_id),
            cache_key = %redact_stream_id(&inner.cache_key),
            "Sync engine created"
        );

        PaginatedSyncEngine { inner }
    }
}
