//! Core service facade.
//!
//! Wires [`CoreConfig`](core_runtime::config::CoreConfig) into an opened
//! cache store and hands out paginated streams for each feed model. Host
//! applications supply the network side as `PageFetcher` and `Resolver`
//! implementations.

pub mod error;
pub mod models;
pub mod service;

pub use error::{Result, ServiceError};
pub use models::{Album, Entry, Playlist, Provider, Track};
pub use service::{
    FeedService, ALBUM_NAMESPACE, ENTRY_NAMESPACE, PLAYLIST_NAMESPACE, TRACK_NAMESPACE,
};

pub use core_runtime::config::{CoreConfig, FeatureFlags};
pub use core_sync::{
    FetchOutcome, ItemChange, LifecycleState, Page, PageFetcher, PaginatedSyncEngine,
    PaginationParams, RepositoryEvent, Resolver,
};
