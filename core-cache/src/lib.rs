//! # Core Cache
//!
//! Durable, namespaced TTL cache used as the offline store of every sync
//! engine.
//!
//! ## Overview
//!
//! - [`CacheStore`] opens the SQLite database, runs migrations and hands out
//!   typed namespaces.
//! - [`TtlCache`] is one namespace. It offers an ordered list under a key
//!   ([`ListHandle`]) and a single-item map keyed by id.
//! - [`SqliteAdapter`] implements `bridge_traits::DatabaseAdapter` with sqlx.
//!
//! ## Usage
//!
//! ```ignore
//! use core_cache::{CacheStore, Identifiable};
//! use bridge_traits::database::DatabaseConfig;
//!
//! let store = CacheStore::open(DatabaseConfig::in_memory()).await?;
//! let cache = store.namespace::<Entry>("entries");
//!
//! let list = cache.list_get_or_create("user/1/category/global.all").await;
//! list.add(&page.items).await?;
//! let offline = list.items().await?;
//! ```
//!
//! ## Failure semantics
//!
//! List operations return [`CacheError`]. Map operations never fail: a
//! storage problem turns into `false` from `map_set` and `None` from
//! `map_get`.

pub mod adapters;
pub mod error;
pub mod store;
pub mod ttl;

pub use adapters::SqliteAdapter;
pub use error::{CacheError, Result};
pub use store::CacheStore;
pub use ttl::{CacheEntry, Identifiable, ListHandle, TtlCache};
