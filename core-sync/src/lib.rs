//! # Sync Module
//!
//! Keeps paginated remote streams, their offline copies and their derived
//! artifacts in step.
//!
//! ## Overview
//!
//! One [`PaginatedSyncEngine`] owns one stream:
//! - Pages come from an injected [`PageFetcher`], with parameters built by a
//!   [`PaginationParamsBuilder`]
//! - Each network update is written through to a `core_cache::TtlCache`
//!   list, which serves as the offline copy on the next start
//! - Each updated item list is handed to a [`DerivedResolutionPipeline`],
//!   which resolves one artifact per item through a [`Resolver`]
//! - Progress is reported on an ordered channel of [`RepositoryEvent`]s
//!
//! ## Components
//!
//! - **Engine** (`engine`): lifecycle state machine and item list snapshots
//! - **Pipeline** (`pipeline`): sequential, deduplicated derived resolution
//! - **Lifecycle** (`lifecycle`): engine states and command outcomes
//! - **Pagination** (`pagination`): pages, request parameters, filters
//! - **Events** (`events`): engine events and shared item changes

pub mod engine;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod lifecycle;
pub mod pagination;
pub mod pipeline;

pub use engine::{PaginatedSyncEngine, SyncEngineBuilder, SyncItem, WeakSyncEngine};
pub use error::{Result, SyncError};
pub use events::{ItemChange, RepositoryEvent};
pub use fetcher::{PageFetcher, Resolver};
pub use lifecycle::{FetchOutcome, LifecycleState};
pub use pagination::{
    DefaultParamsBuilder, Page, PaginationParams, PaginationParamsBuilder, StreamFilters,
};
pub use pipeline::DerivedResolutionPipeline;
