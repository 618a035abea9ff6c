//! Collaborators injected into engines: page source and derived resolver.

use crate::error::Result;
use crate::pagination::{Page, PaginationParams};
use async_trait::async_trait;

/// Remote source of pages for a stream.
///
/// Implementations own transport, authentication and timeouts. A failure
/// should be reported as [`SyncError::Network`](crate::SyncError::Network)
/// so the engine treats it as retryable.
#[async_trait]
pub trait PageFetcher<I>: Send + Sync {
    async fn fetch_page(&self, stream_id: &str, params: &PaginationParams) -> Result<Page<I>>;
}

/// Computes the derived artifact of one item (e.g. a playlist for an entry).
#[async_trait]
pub trait Resolver<I, D>: Send + Sync {
    async fn resolve(&self, item: &I) -> Result<D>;
}
