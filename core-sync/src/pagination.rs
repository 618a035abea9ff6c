//! Pagination types shared by the engine and page fetchers.
//!
//! The engine never builds request parameters inline. It asks a
//! [`PaginationParamsBuilder`] for a fresh [`PaginationParams`] on every call,
//! so a stream type that needs different parameters (for example a search
//! endpoint that ignores `unread_only`) swaps the builder instead of
//! subclassing the engine.

use core_runtime::config::CoreConfig;
use serde::{Deserialize, Serialize};

/// One page returned by a [`PageFetcher`](crate::PageFetcher).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<I> {
    pub id: String,
    /// Newest-item watermark (epoch ms) reported by the remote service
    pub updated: Option<i64>,
    /// Cursor for the next forward page; `None` marks the end of the stream
    pub continuation: Option<String>,
    pub items: Vec<I>,
}

impl<I> Page<I> {
    pub fn new(id: impl Into<String>, items: Vec<I>) -> Self {
        Self {
            id: id.into(),
            updated: None,
            continuation: None,
            items,
        }
    }

    pub fn with_continuation(mut self, continuation: impl Into<String>) -> Self {
        self.continuation = Some(continuation.into());
        self
    }

    pub fn with_updated(mut self, updated: i64) -> Self {
        self.updated = Some(updated);
        self
    }

    /// Whether forward pagination ends with this page.
    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}

/// Parameters of a single page request. Built fresh for every call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaginationParams {
    pub count: u32,
    pub unread_only: bool,
    pub continuation: Option<String>,
    /// Only items newer than this watermark (epoch ms)
    pub newer_than: Option<i64>,
    /// Only items older than this watermark (epoch ms)
    pub older_than: Option<i64>,
}

/// Filters an engine is created with and keeps for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFilters {
    pub count: u32,
    pub unread_only: bool,
}

impl StreamFilters {
    pub fn new(count: u32, unread_only: bool) -> Self {
        Self { count, unread_only }
    }

    /// Suffix appended to the stream id to form the cache key, so an
    /// unread-only view never overwrites the full stream's offline copy.
    pub fn cache_suffix(&self) -> &'static str {
        if self.unread_only {
            "#unread"
        } else {
            ""
        }
    }
}

impl Default for StreamFilters {
    fn default() -> Self {
        Self::from(&CoreConfig::default())
    }
}

impl From<&CoreConfig> for StreamFilters {
    fn from(config: &CoreConfig) -> Self {
        Self {
            count: config.page_size,
            unread_only: config.unread_only,
        }
    }
}

/// Strategy that turns the engine's cursor state into request parameters.
pub trait PaginationParamsBuilder: Send + Sync {
    /// Parameters for the next forward page.
    fn next_page(&self, filters: &StreamFilters, continuation: Option<&str>) -> PaginationParams;

    /// Parameters for items newer than `last_updated`.
    fn latest(&self, filters: &StreamFilters, last_updated: Option<i64>) -> PaginationParams;
}

/// Forward pages follow the continuation token; latest requests use the
/// watermark and never carry a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParamsBuilder;

impl PaginationParamsBuilder for DefaultParamsBuilder {
    fn next_page(&self, filters: &StreamFilters, continuation: Option<&str>) -> PaginationParams {
        PaginationParams {
            count: filters.count,
            unread_only: filters.unread_only,
            continuation: continuation.map(str::to_string),
            newer_than: None,
            older_than: None,
        }
    }

    fn latest(&self, filters: &StreamFilters, last_updated: Option<i64>) -> PaginationParams {
        PaginationParams {
            count: filters.count,
            unread_only: filters.unread_only,
            continuation: None,
            newer_than: last_updated,
            older_than: None,
        }
    }
}
