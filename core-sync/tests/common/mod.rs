//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::database::DatabaseConfig;
use core_async::sync::Notify;
use core_cache::{CacheStore, Identifiable, TtlCache};
use core_runtime::events::EventStream;
use core_sync::{Page, PageFetcher, PaginationParams, RepositoryEvent, Resolver, SyncError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

pub const STREAM: &str = "user/42/category/global.all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub title: String,
}

impl Identifiable for Entry {
    fn id(&self) -> &str {
        &self.id
    }
}

pub fn entry(id: &str) -> Entry {
    Entry {
        id: id.to_string(),
        title: format!("Entry {}", id),
    }
}

pub fn entries(ids: &[&str]) -> Vec<Entry> {
    ids.iter().map(|id| entry(id)).collect()
}

pub fn ids(items: &[Entry]) -> Vec<&str> {
    items.iter().map(|item| item.id.as_str()).collect()
}

pub fn page(ids: &[&str], continuation: Option<&str>) -> Page<Entry> {
    let page = Page::new(format!("page-{}", ids.join("-")), entries(ids));
    match continuation {
        Some(token) => page.with_continuation(token),
        None => page,
    }
}

pub fn names<I, D>(events: &[RepositoryEvent<I, D>]) -> Vec<&'static str> {
    events.iter().map(RepositoryEvent::name).collect()
}

pub async fn open_cache(namespace: &str) -> (CacheStore, TtlCache<Entry>) {
    let store = CacheStore::open(DatabaseConfig::in_memory()).await.unwrap();
    let cache = store.namespace(namespace);
    (store, cache)
}

/// Waits for the next event, failing the test after a second.
pub async fn next_event<I: Clone, D: Clone>(
    stream: &mut EventStream<RepositoryEvent<I, D>>,
) -> RepositoryEvent<I, D> {
    core_async::time::timeout(Duration::from_secs(1), stream.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Page fetcher that replays scripted responses in order.
///
/// With a gate, every call parks until the gate is notified.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<VecDeque<core_sync::Result<Page<Entry>>>>,
    pub requests: Mutex<Vec<PaginationParams>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedFetcher {
    pub fn new(responses: Vec<core_sync::Result<Page<Entry>>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        })
    }

    pub fn gated(responses: Vec<core_sync::Result<Page<Entry>>>, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Yields until at least `count` requests have started.
    pub async fn wait_for_requests(&self, count: usize) {
        while self.request_count() < count {
            core_async::task::yield_now().await;
        }
    }
}

#[async_trait]
impl PageFetcher<Entry> for ScriptedFetcher {
    async fn fetch_page(
        &self,
        _stream_id: &str,
        params: &PaginationParams,
    ) -> core_sync::Result<Page<Entry>> {
        self.requests.lock().push(params.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Network("no scripted response".into())))
    }
}

/// Builds a playlist name per entry, failing for the listed ids.
#[derive(Default)]
pub struct PlaylistResolver {
    pub fail: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Resolver<Entry, String> for PlaylistResolver {
    async fn resolve(&self, item: &Entry) -> core_sync::Result<String> {
        self.calls.lock().push(item.id.clone());
        if self.fail.contains(&item.id) {
            return Err(SyncError::Resolution {
                item_id: item.id.clone(),
                message: "no playable links".into(),
            });
        }
        Ok(format!("playlist-{}", item.id))
    }
}
