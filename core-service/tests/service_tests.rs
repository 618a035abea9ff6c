//! Integration tests for `FeedService` wiring

use anyhow::Result;
use async_trait::async_trait;
use bridge_traits::time::ManualClock;
use chrono::{DateTime, TimeZone, Utc};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventStream;
use core_service::{
    Entry, FeedService, FetchOutcome, ItemChange, LifecycleState, Page, PageFetcher,
    PaginationParams, Playlist, Provider, RepositoryEvent, Resolver, ServiceError, Track,
};
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const STREAM: &str = "user/42/category/global.all";

mock! {
    pub EntryFetcher {}

    #[async_trait]
    impl PageFetcher<Entry> for EntryFetcher {
        async fn fetch_page(&self, stream_id: &str, params: &PaginationParams) -> core_sync::Result<Page<Entry>>;
    }
}

mock! {
    pub PlaylistResolver {}

    #[async_trait]
    impl Resolver<Entry, Playlist> for PlaylistResolver {
        async fn resolve(&self, item: &Entry) -> core_sync::Result<Playlist>;
    }
}

mock! {
    pub TrackFetcher {}

    #[async_trait]
    impl PageFetcher<Track> for TrackFetcher {
        async fn fetch_page(&self, stream_id: &str, params: &PaginationParams) -> core_sync::Result<Page<Track>>;
    }
}

fn published() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn entry_page(ids: &[&str]) -> Page<Entry> {
    let entries = ids
        .iter()
        .map(|id| Entry::new(*id, format!("Entry {}", id), published()))
        .collect();
    Page::new("page", entries)
}

/// Fetcher that serves the same terminal page for every request.
fn fetcher_with(ids: &'static [&'static str]) -> Arc<MockEntryFetcher> {
    let mut fetcher = MockEntryFetcher::new();
    fetcher
        .expect_fetch_page()
        .returning(move |_, _| Ok(entry_page(ids)));
    Arc::new(fetcher)
}

fn resolver() -> Arc<MockPlaylistResolver> {
    let mut resolver = MockPlaylistResolver::new();
    resolver.expect_resolve().returning(|entry| {
        let track = Track::new(Provider::YouTube, format!("video-{}", entry.id), "Clip");
        Ok(Playlist::for_entry(entry, vec![track]))
    });
    Arc::new(resolver)
}

async fn next_event<I: Clone, D: Clone>(
    stream: &mut EventStream<RepositoryEvent<I, D>>,
) -> Result<RepositoryEvent<I, D>> {
    Ok(core_async::time::timeout(Duration::from_secs(1), stream.recv()).await??)
}

#[core_async::test]
async fn test_entry_stream_resolves_playlists_in_order() -> Result<()> {
    let service = FeedService::new(CoreConfig::default()).await?;
    let stream = service.entry_stream(STREAM, fetcher_with(&["e1", "e2"]), resolver())?;
    let mut events = stream.subscribe();

    assert_eq!(stream.fetch_next().await, FetchOutcome::Applied);
    assert_eq!(stream.current_state(), LifecycleState::Complete);

    let mut playlists = Vec::new();
    while playlists.len() < 2 {
        if let RepositoryEvent::CompleteLoadingDerived { item, artifact } =
            next_event(&mut events).await?
        {
            assert_eq!(artifact.title, item.title);
            playlists.push(artifact.id);
        }
    }
    assert_eq!(playlists, vec!["entry:e1", "entry:e2"]);
    Ok(())
}

#[core_async::test]
async fn test_streams_use_configured_page_size() -> Result<()> {
    let config = CoreConfig::builder().page_size(50).unread_only(true).build()?;
    let service = FeedService::new(config).await?;

    let mut fetcher = MockTrackFetcher::new();
    fetcher
        .expect_fetch_page()
        .withf(|_, params| params.count == 50 && params.unread_only)
        .times(1)
        .returning(|_, _| Ok(Page::new("tracks", Vec::new())));

    let stream = service.track_stream("user/42/tag/liked-tracks", Arc::new(fetcher))?;
    assert_eq!(stream.fetch_next().await, FetchOutcome::Applied);
    assert!(stream.cache_key().ends_with("#unread"));
    Ok(())
}

#[core_async::test]
async fn test_offline_copy_is_shared_between_streams() -> Result<()> {
    let service = FeedService::new(CoreConfig::default()).await?;

    let first = service.entry_stream(STREAM, fetcher_with(&["e1", "e2"]), resolver())?;
    first.fetch_next().await;

    let mut offline = MockEntryFetcher::new();
    offline.expect_fetch_page().never();
    let second = service.entry_stream(STREAM, Arc::new(offline), resolver())?;
    second.fetch_cache_items().await;

    let ids: Vec<_> = second.get_items().iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids, vec!["e1", "e2"]);
    Ok(())
}

#[core_async::test]
async fn test_disabled_features_skip_cache_and_resolution() -> Result<()> {
    let config = CoreConfig::builder()
        .enable_offline_cache(false)
        .enable_derived_resolution(false)
        .build()?;
    let service = FeedService::new(config).await?;

    let mut never = MockPlaylistResolver::new();
    never.expect_resolve().never();
    let stream = service.entry_stream(STREAM, fetcher_with(&["e1"]), Arc::new(never))?;
    assert!(stream.pipeline().is_none());

    stream.fetch_next().await;
    let cached = service
        .entry_cache()
        .list_get_or_create(stream.cache_key())
        .await
        .items()
        .await?;
    assert!(cached.is_empty());
    Ok(())
}

#[core_async::test]
async fn test_entry_changes_reach_open_streams() -> Result<()> {
    let service = FeedService::new(CoreConfig::default()).await?;
    let stream = service.entry_stream(STREAM, fetcher_with(&["e1", "e2"]), resolver())?;
    stream.fetch_next().await;
    let mut events = stream.subscribe().filter(|event| {
        matches!(
            event,
            RepositoryEvent::UpdatedAt(_) | RepositoryEvent::RemovedAt(_)
        )
    });

    let read = stream.get_items()[1].marked_read();
    service.entry_changes().publish(ItemChange::Updated(read));

    assert_eq!(next_event(&mut events).await?, RepositoryEvent::UpdatedAt(1));
    assert!(!stream.get_items()[1].unread);
    Ok(())
}

#[core_async::test]
async fn test_clear_cache_drops_every_namespace() -> Result<()> {
    let service = FeedService::new(CoreConfig::default()).await?;
    let stream = service.entry_stream(STREAM, fetcher_with(&["e1"]), resolver())?;
    stream.fetch_next().await;

    let track = Track::new(Provider::SoundCloud, "42", "Song");
    assert!(service.track_cache().map_set(&track.id, &track).await);

    service.clear_cache().await?;

    let list = service.entry_cache().list_get_or_create(stream.cache_key()).await;
    assert!(list.items().await?.is_empty());
    assert!(service.track_cache().map_get(&track.id).await.is_none());
    Ok(())
}

#[core_async::test]
async fn test_evict_older_than_uses_cache_timestamps() -> Result<()> {
    let clock = Arc::new(ManualClock::new(1_000));
    let config = CoreConfig::builder().cache_max_age(None).build()?;
    let service = FeedService::with_clock(config, clock.clone()).await?;

    let old = Track::new(Provider::YouTube, "old", "Old");
    service.track_cache().map_set(&old.id, &old).await;
    clock.set_millis(5_000);
    let fresh = Track::new(Provider::YouTube, "fresh", "Fresh");
    service.track_cache().map_set(&fresh.id, &fresh).await;

    let cutoff = Utc
        .timestamp_millis_opt(2_000)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid cutoff"))?;
    assert_eq!(service.evict_older_than(cutoff).await?, 1);

    assert!(service.track_cache().map_get(&old.id).await.is_none());
    assert!(service.track_cache().map_get(&fresh.id).await.is_some());
    Ok(())
}

#[core_async::test]
async fn test_file_backed_store_survives_restart() -> Result<()> {
    let path = std::env::temp_dir().join(format!("feedsync-service-{}.db", Uuid::new_v4()));
    let config = || CoreConfig::builder().database_path(path.clone()).build();

    let service = FeedService::new(config()?).await?;
    let stream = service.entry_stream(STREAM, fetcher_with(&["e1", "e2"]), resolver())?;
    stream.fetch_next().await;
    service.shutdown().await?;

    let reopened = FeedService::new(config()?).await?;
    let mut offline = MockEntryFetcher::new();
    offline.expect_fetch_page().never();
    let stream = reopened.entry_stream(STREAM, Arc::new(offline), resolver())?;
    stream.fetch_cache_items().await;
    assert_eq!(stream.get_items().len(), 2);

    reopened.shutdown().await?;
    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[core_async::test]
async fn test_shutdown_disposes_streams_and_rejects_new_ones() -> Result<()> {
    let service = FeedService::new(CoreConfig::default()).await?;
    let stream = service.entry_stream(STREAM, fetcher_with(&["e1"]), resolver())?;

    service.shutdown().await?;
    assert!(service.is_shut_down());
    assert!(stream.is_disposed());
    assert_eq!(stream.fetch_next().await, FetchOutcome::Skipped);

    let rejected = service.entry_stream(STREAM, fetcher_with(&["e1"]), resolver());
    assert!(matches!(rejected, Err(ServiceError::ShutDown)));

    // idempotent
    service.shutdown().await?;
    Ok(())
}

#[core_async::test]
async fn test_invalid_config_is_rejected() {
    let config = CoreConfig {
        page_size: 0,
        ..CoreConfig::default()
    };

    let result = FeedService::new(config).await;
    assert!(matches!(result, Err(ServiceError::Runtime(_))));
}

#[core_async::test]
async fn test_dropped_streams_release_their_fetcher() -> Result<()> {
    let service = FeedService::new(CoreConfig::default()).await?;
    let fetcher = Arc::new(MockTrackFetcher::new());

    for _ in 0..3 {
        let stream = service.track_stream("user/42/tag/liked-tracks", fetcher.clone())?;
        assert_eq!(service.open_streams(), 1);
        drop(stream);
    }

    assert_eq!(Arc::strong_count(&fetcher), 1);
    assert_eq!(service.open_streams(), 0);

    // shutdown still works with only dropped streams registered
    service.shutdown().await?;
    Ok(())
}

#[core_async::test]
async fn test_unbounded_max_age_keeps_offline_copy() -> Result<()> {
    let config = CoreConfig::builder()
        .cache_max_age(Some(Duration::MAX))
        .build()?;
    let service = FeedService::new(config).await?;

    let first = service.entry_stream(STREAM, fetcher_with(&["e1", "e2"]), resolver())?;
    first.fetch_next().await;

    let mut offline = MockEntryFetcher::new();
    offline.expect_fetch_page().never();
    let second = service.entry_stream(STREAM, Arc::new(offline), resolver())?;
    second.fetch_cache_items().await;

    assert_eq!(second.get_items().len(), 2);
    Ok(())
}
