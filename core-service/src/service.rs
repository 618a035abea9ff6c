//! # Feed Service
//!
//! Owns the process-wide pieces every stream shares: the cache store, one
//! typed cache namespace per model and one change bus per model. Engines are
//! built from the service so they pick up the configured filters, eviction
//! age and memo capacity.
//!
//! ```ignore
//! let service = FeedService::new(CoreConfig::default()).await?;
//! let stream = service.entry_stream("user/42/category/global.all", fetcher, resolver)?;
//! stream.fetch_cache_items().await;
//! stream.fetch_next().await;
//! ```

use crate::error::{Result, ServiceError};
use crate::models::{Album, Entry, Playlist, Track};
use bridge_traits::database::DatabaseConfig;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_cache::{CacheStore, TtlCache};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_runtime::logging::redact_stream_id;
use core_sync::{
    ItemChange, PageFetcher, PaginatedSyncEngine, Resolver, StreamFilters, SyncItem,
    WeakSyncEngine,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const ENTRY_NAMESPACE: &str = "entries";
pub const TRACK_NAMESPACE: &str = "tracks";
pub const ALBUM_NAMESPACE: &str = "albums";
pub const PLAYLIST_NAMESPACE: &str = "playlists";

/// Type-erased handle used to dispose every engine on shutdown. Holds the
/// engine weakly: a stream dropped by its caller is released right away.
trait Disposable: Send + Sync {
    fn dispose(&self);
    /// True once the engine was disposed or dropped.
    fn is_disposed(&self) -> bool;
}

impl<I, D> Disposable for WeakSyncEngine<I, D>
where
    I: SyncItem,
    D: Clone + Send + Sync + 'static,
{
    fn dispose(&self) {
        if let Some(engine) = self.upgrade() {
            engine.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.upgrade().map_or(true, |engine| engine.is_disposed())
    }
}

/// One model's cache namespace and change bus.
struct Collection<I> {
    cache: TtlCache<I>,
    changes: EventBus<ItemChange<I>>,
}

impl<I: SyncItem> Collection<I> {
    fn new(store: &CacheStore, namespace: &str, config: &CoreConfig) -> Self {
        let mut cache = store.namespace(namespace);
        if let Some(max_age) = config.cache_max_age {
            cache = cache.with_max_age(max_age);
        }
        Self {
            cache,
            changes: EventBus::new(config.event_buffer_size),
        }
    }
}

struct ServiceState {
    shut_down: bool,
    engines: Vec<Box<dyn Disposable>>,
}

/// Primary facade exposed to host applications.
pub struct FeedService {
    config: CoreConfig,
    store: CacheStore,
    entries: Collection<Entry>,
    tracks: Collection<Track>,
    albums: Collection<Album>,
    playlists: Collection<Playlist>,
    state: Mutex<ServiceState>,
}

impl FeedService {
    /// Opens the cache store described by `config` and runs its migrations.
    ///
    /// Without a `database_path` the store lives in memory.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Same as [`new`](Self::new) with an injected clock for cache timestamps.
    #[instrument(skip(config, clock))]
    pub async fn with_clock(config: CoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let db_config = match &config.database_path {
            Some(path) => DatabaseConfig::new(path.clone()),
            None => DatabaseConfig::in_memory(),
        };
        let store = CacheStore::open(db_config).await?.with_clock(clock);

        info!(
            in_memory = config.database_path.is_none(),
            page_size = config.page_size,
            offline_cache = config.features.offline_cache,
            derived_resolution = config.features.derived_resolution,
            "Feed service started"
        );

        Ok(Self::from_store(config, store))
    }

    /// Builds the service over an already opened store.
    pub fn from_store(config: CoreConfig, store: CacheStore) -> Self {
        Self {
            entries: Collection::new(&store, ENTRY_NAMESPACE, &config),
            tracks: Collection::new(&store, TRACK_NAMESPACE, &config),
            albums: Collection::new(&store, ALBUM_NAMESPACE, &config),
            playlists: Collection::new(&store, PLAYLIST_NAMESPACE, &config),
            config,
            store,
            state: Mutex::new(ServiceState {
                shut_down: false,
                engines: Vec::new(),
            }),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn entry_cache(&self) -> &TtlCache<Entry> {
        &self.entries.cache
    }

    pub fn track_cache(&self) -> &TtlCache<Track> {
        &self.tracks.cache
    }

    pub fn album_cache(&self) -> &TtlCache<Album> {
        &self.albums.cache
    }

    pub fn playlist_cache(&self) -> &TtlCache<Playlist> {
        &self.playlists.cache
    }

    /// Bus shared by every entry stream; publish here to update them all.
    pub fn entry_changes(&self) -> &EventBus<ItemChange<Entry>> {
        &self.entries.changes
    }

    pub fn track_changes(&self) -> &EventBus<ItemChange<Track>> {
        &self.tracks.changes
    }

    pub fn album_changes(&self) -> &EventBus<ItemChange<Album>> {
        &self.albums.changes
    }

    pub fn playlist_changes(&self) -> &EventBus<ItemChange<Playlist>> {
        &self.playlists.changes
    }

    // ========================================================================
    // Streams
    // ========================================================================

    /// Entry stream whose entries are resolved into playlists.
    ///
    /// The resolver is ignored when derived resolution is disabled.
    pub fn entry_stream(
        &self,
        stream_id: &str,
        fetcher: Arc<dyn PageFetcher<Entry>>,
        resolver: Arc<dyn Resolver<Entry, Playlist>>,
    ) -> Result<PaginatedSyncEngine<Entry, Playlist>> {
        self.build_stream(stream_id, fetcher, &self.entries, Some(resolver))
    }

    pub fn track_stream(
        &self,
        stream_id: &str,
        fetcher: Arc<dyn PageFetcher<Track>>,
    ) -> Result<PaginatedSyncEngine<Track>> {
        self.build_stream(stream_id, fetcher, &self.tracks, None)
    }

    pub fn album_stream(
        &self,
        stream_id: &str,
        fetcher: Arc<dyn PageFetcher<Album>>,
    ) -> Result<PaginatedSyncEngine<Album>> {
        self.build_stream(stream_id, fetcher, &self.albums, None)
    }

    pub fn playlist_stream(
        &self,
        stream_id: &str,
        fetcher: Arc<dyn PageFetcher<Playlist>>,
    ) -> Result<PaginatedSyncEngine<Playlist>> {
        self.build_stream(stream_id, fetcher, &self.playlists, None)
    }

    fn build_stream<I, D>(
        &self,
        stream_id: &str,
        fetcher: Arc<dyn PageFetcher<I>>,
        collection: &Collection<I>,
        resolver: Option<Arc<dyn Resolver<I, D>>>,
    ) -> Result<PaginatedSyncEngine<I, D>>
    where
        I: SyncItem,
        D: Clone + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(ServiceError::ShutDown);
        }

        let features = self.config.features;
        let mut builder = PaginatedSyncEngine::builder(stream_id, fetcher)
            .filters(StreamFilters::from(&self.config))
            .memo_capacity(self.config.derived_memo_capacity)
            .event_capacity(self.config.event_buffer_size)
            .change_bus(collection.changes.clone());
        if features.offline_cache {
            builder = builder.cache(collection.cache.clone());
        }
        if let Some(resolver) = resolver.filter(|_| features.derived_resolution) {
            builder = builder.resolver(resolver);
        }
        let engine = builder.build();

        state.engines.retain(|engine| !engine.is_disposed());
        state.engines.push(Box::new(engine.downgrade()));

        debug!(
            stream_id = %redact_stream_id(stream_id),
            namespace = collection.cache.namespace(),
            live_engines = state.engines.len(),
            "Stream created"
        );
        Ok(engine)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drops every cached row of every model, e.g. on logout.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<()> {
        self.entries.cache.delete_all_items().await?;
        self.tracks.cache.delete_all_items().await?;
        self.albums.cache.delete_all_items().await?;
        self.playlists.cache.delete_all_items().await?;

        info!("Cleared offline cache");
        Ok(())
    }

    /// Deletes rows written before `cutoff` and returns how many went.
    #[instrument(skip(self))]
    pub async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let before = cutoff.timestamp_millis();

        let removed = self.entries.cache.delete_old_items(before).await?
            + self.tracks.cache.delete_old_items(before).await?
            + self.albums.cache.delete_old_items(before).await?
            + self.playlists.cache.delete_old_items(before).await?;

        info!(removed, "Evicted stale cache rows");
        Ok(removed)
    }

    /// Disposes every stream built so far and closes the store. Later stream
    /// requests fail with [`ServiceError::ShutDown`].
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        let engines = {
            let mut state = self.state.lock();
            if state.shut_down {
                return Ok(());
            }
            state.shut_down = true;
            std::mem::take(&mut state.engines)
        };

        for engine in &engines {
            engine.dispose();
        }
        self.store.close().await?;

        info!(disposed = engines.len(), "Feed service shut down");
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// Streams built by this service that are neither disposed nor dropped.
    pub fn open_streams(&self) -> usize {
        self.state
            .lock()
            .engines
            .iter()
            .filter(|engine| !engine.is_disposed())
            .count()
    }
}

impl std::fmt::Debug for FeedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedService")
            .field("database_path", &self.config.database_path)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
