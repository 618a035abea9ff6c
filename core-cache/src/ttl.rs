//! Namespaced TTL cache
//!
//! Two access shapes share one namespace:
//!
//! - **Lists**: an ordered sequence of items under a key ([`ListHandle`]).
//!   Members are appended in one transaction together with the handle's
//!   timestamp, so a reader never sees a half-applied `add`.
//! - **Map**: single items keyed by their id ([`TtlCache::map_set`] /
//!   [`TtlCache::map_get`]).
//!
//! Every row carries an epoch-millisecond timestamp read from the injected
//! [`Clock`]. Eviction only happens when asked for, either explicitly through
//! [`TtlCache::delete_old_items`] or after each write when a max age is
//! configured with [`TtlCache::with_max_age`].

use crate::error::{CacheError, Result};
use bridge_traits::database::{DatabaseAdapter, QueryRow, QueryValue};
use bridge_traits::time::Clock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Items with a stable identity.
///
/// Two values with the same id are the same item, whatever their other fields
/// say. Caches, change buses and the derived pipeline all key on this id.
pub trait Identifiable {
    fn id(&self) -> &str;
}

/// A cached value together with the time it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<I> {
    pub key: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub payload: I,
}

// ============================================================================
// SQL
// ============================================================================

const TOUCH_LIST: &str = "INSERT INTO cache_lists (namespace, key, timestamp) VALUES (?, ?, ?)
     ON CONFLICT(namespace, key) DO UPDATE SET timestamp = excluded.timestamp";

const CREATE_LIST: &str =
    "INSERT OR IGNORE INTO cache_lists (namespace, key, timestamp) VALUES (?, ?, ?)";

// Position is computed inside the transaction so concurrent appends to the
// same key never collide.
const APPEND_LIST_ITEM: &str = "INSERT INTO cache_list_items
        (namespace, list_key, position, item_id, payload, timestamp)
     SELECT ?, ?, COALESCE(MAX(position), -1) + 1, ?, ?, ?
     FROM cache_list_items WHERE namespace = ? AND list_key = ?";

const DELETE_LIST_ITEMS: &str = "DELETE FROM cache_list_items WHERE namespace = ? AND list_key = ?";

const DELETE_LIST: &str = "DELETE FROM cache_lists WHERE namespace = ? AND key = ?";

const UPSERT_ENTRY: &str = "INSERT INTO cache_entries (namespace, id, payload, timestamp) VALUES (?, ?, ?, ?)
     ON CONFLICT(namespace, id) DO UPDATE SET payload = excluded.payload, timestamp = excluded.timestamp";

// ============================================================================
// TtlCache
// ============================================================================

/// One namespace of the cache, typed by the item it stores.
///
/// Cloning is cheap; clones share the adapter and clock.
pub struct TtlCache<I> {
    db: Arc<dyn DatabaseAdapter>,
    namespace: Arc<str>,
    clock: Arc<dyn Clock>,
    max_age: Option<Duration>,
    _item: PhantomData<fn() -> I>,
}

impl<I> Clone for TtlCache<I> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            namespace: Arc::clone(&self.namespace),
            clock: Arc::clone(&self.clock),
            max_age: self.max_age,
            _item: PhantomData,
        }
    }
}

impl<I> fmt::Debug for TtlCache<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("namespace", &self.namespace)
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl<I> TtlCache<I>
where
    I: Identifiable + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(
        db: Arc<dyn DatabaseAdapter>,
        namespace: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let namespace: String = namespace.into();
        Self {
            db,
            namespace: Arc::from(namespace),
            clock,
            max_age: None,
            _item: PhantomData,
        }
    }

    /// Evict rows older than `max_age` after every successful write.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    fn now_millis(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    /// Returns the list stored under `key`, creating an empty one if needed.
    ///
    /// Never fails: a storage error is logged and the handle is returned
    /// anyway, so later operations on it report the error themselves.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn list_get_or_create(&self, key: &str) -> ListHandle<I> {
        let params = [
            QueryValue::from(self.namespace()),
            QueryValue::from(key),
            QueryValue::Integer(self.now_millis()),
        ];

        if let Err(e) = self.db.execute(CREATE_LIST, &params).await {
            warn!(key = %key, error = %e, "Failed to create cache list");
        }

        ListHandle {
            cache: self.clone(),
            key: key.to_string(),
        }
    }

    /// Upserts a single item keyed by `id`, stamped with now.
    ///
    /// Returns `false` when the item could not be serialized or stored.
    #[instrument(skip(self, item), fields(namespace = %self.namespace))]
    pub async fn map_set(&self, id: &str, item: &I) -> bool {
        let payload = match serde_json::to_string(item) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to serialize cache entry");
                return false;
            }
        };

        let params = [
            QueryValue::from(self.namespace()),
            QueryValue::from(id),
            QueryValue::Text(payload),
            QueryValue::Integer(self.now_millis()),
        ];

        match self.db.execute(UPSERT_ENTRY, &params).await {
            Ok(_) => {
                self.evict_expired().await;
                true
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to store cache entry");
                false
            }
        }
    }

    /// Returns the entry stored under `id`, if any.
    ///
    /// Storage and decode failures are logged and reported as a miss.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn map_get(&self, id: &str) -> Option<CacheEntry<I>> {
        let row = self
            .db
            .query_one_optional(
                "SELECT id, payload, timestamp FROM cache_entries WHERE namespace = ? AND id = ?",
                &[self.namespace().into(), id.into()],
            )
            .await;

        let row = match row {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!(id = %id, "Cache entry miss");
                return None;
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        match Self::row_to_entry(&row) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(id = %id, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    fn row_to_entry(row: &QueryRow) -> Result<CacheEntry<I>> {
        let payload = get_string(row, "cache_entries", "payload")?;
        Ok(CacheEntry {
            key: get_string(row, "cache_entries", "id")?,
            timestamp: get_i64(row, "cache_entries", "timestamp")?,
            payload: serde_json::from_str(&payload)?,
        })
    }

    /// Removes every list, list member and map entry in this namespace.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn delete_all_items(&self) -> Result<()> {
        let ns = || vec![QueryValue::from(self.namespace())];

        self.db
            .execute_batch(&[
                ("DELETE FROM cache_list_items WHERE namespace = ?", ns()),
                ("DELETE FROM cache_lists WHERE namespace = ?", ns()),
                ("DELETE FROM cache_entries WHERE namespace = ?", ns()),
            ])
            .await
            .map_err(|e| {
                error!("Failed to clear cache namespace: {}", e);
                CacheError::from(e)
            })?;

        debug!("Cleared cache namespace");
        Ok(())
    }

    /// Removes rows whose timestamp is older than `before` (epoch ms).
    ///
    /// Lists expire as a whole: a handle older than the cutoff takes all of
    /// its members with it, while a handle touched since keeps every member.
    /// Returns the total number of rows removed.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn delete_old_items(&self, before: i64) -> Result<u64> {
        let ns_before = || vec![QueryValue::from(self.namespace()), QueryValue::Integer(before)];

        let removed = self
            .db
            .execute_batch(&[
                (
                    "DELETE FROM cache_entries WHERE namespace = ? AND timestamp < ?",
                    ns_before(),
                ),
                (
                    "DELETE FROM cache_list_items WHERE namespace = ? AND list_key IN
                        (SELECT key FROM cache_lists WHERE namespace = ? AND timestamp < ?)",
                    vec![
                        QueryValue::from(self.namespace()),
                        QueryValue::from(self.namespace()),
                        QueryValue::Integer(before),
                    ],
                ),
                (
                    "DELETE FROM cache_lists WHERE namespace = ? AND timestamp < ?",
                    ns_before(),
                ),
            ])
            .await
            .map_err(|e| {
                error!("Failed to delete expired cache rows: {}", e);
                CacheError::from(e)
            })?
            .into_iter()
            .sum::<u64>();

        if removed > 0 {
            debug!(removed, before, "Deleted expired cache rows");
        }
        Ok(removed)
    }

    async fn evict_expired(&self) {
        let Some(max_age) = self.max_age else {
            return;
        };

        let max_age = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.now_millis().saturating_sub(max_age);
        if let Err(e) = self.delete_old_items(cutoff).await {
            warn!(namespace = %self.namespace, error = %e, "Cache eviction failed");
        }
    }
}

// ============================================================================
// ListHandle
// ============================================================================

/// Handle to the ordered list stored under one key.
pub struct ListHandle<I> {
    cache: TtlCache<I>,
    key: String,
}

impl<I> Clone for ListHandle<I> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key: self.key.clone(),
        }
    }
}

impl<I> fmt::Debug for ListHandle<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListHandle")
            .field("namespace", &self.cache.namespace)
            .field("key", &self.key)
            .finish()
    }
}

impl<I> ListHandle<I>
where
    I: Identifiable + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn key(&self) -> &str {
        &self.key
    }

    fn list_params(&self) -> Vec<QueryValue> {
        vec![
            QueryValue::from(self.cache.namespace()),
            QueryValue::from(self.key.as_str()),
        ]
    }

    /// Builds the statements that stamp the handle and append `items`.
    fn append_statements(&self, items: &[I], now: i64) -> Result<Vec<(&'static str, Vec<QueryValue>)>> {
        let mut statements = Vec::with_capacity(items.len() + 1);

        // Writing the handle first takes the write lock before any position is read.
        let mut touch = self.list_params();
        touch.push(QueryValue::Integer(now));
        statements.push((TOUCH_LIST, touch));

        for item in items {
            let payload = serde_json::to_string(item)?;
            let mut params = self.list_params();
            params.extend([
                QueryValue::from(item.id()),
                QueryValue::Text(payload),
                QueryValue::Integer(now),
            ]);
            params.extend(self.list_params());
            statements.push((APPEND_LIST_ITEM, params));
        }

        Ok(statements)
    }

    async fn run(&self, statements: Vec<(&'static str, Vec<QueryValue>)>) -> Result<()> {
        self.cache.db.execute_batch(&statements).await.map_err(|e| {
            error!(key = %self.key, "Cache list transaction failed: {}", e);
            CacheError::from(e)
        })?;
        Ok(())
    }

    /// Appends `items` and sets the handle timestamp to now, atomically.
    #[instrument(skip(self, items), fields(namespace = %self.cache.namespace, key = %self.key, count = items.len()))]
    pub async fn add(&self, items: &[I]) -> Result<()> {
        let statements = self.append_statements(items, self.cache.now_millis())?;
        self.run(statements).await?;

        debug!("Appended items to cache list");
        self.cache.evict_expired().await;
        Ok(())
    }

    /// Replaces the list contents with `items` in one transaction.
    #[instrument(skip(self, items), fields(namespace = %self.cache.namespace, key = %self.key, count = items.len()))]
    pub async fn replace(&self, items: &[I]) -> Result<()> {
        let mut statements = self.append_statements(items, self.cache.now_millis())?;
        // After the handle is stamped, before the first append.
        statements.insert(1, (DELETE_LIST_ITEMS, self.list_params()));
        self.run(statements).await?;

        debug!("Replaced cache list");
        self.cache.evict_expired().await;
        Ok(())
    }

    /// Deletes every member and the handle itself.
    #[instrument(skip(self), fields(namespace = %self.cache.namespace, key = %self.key))]
    pub async fn clear(&self) -> Result<()> {
        self.run(vec![
            (DELETE_LIST_ITEMS, self.list_params()),
            (DELETE_LIST, self.list_params()),
        ])
        .await
    }

    /// Copies the members out in insertion order.
    pub async fn items(&self) -> Result<Vec<I>> {
        let rows = self
            .cache
            .db
            .query(
                "SELECT payload FROM cache_list_items
                 WHERE namespace = ? AND list_key = ? ORDER BY position",
                &self.list_params(),
            )
            .await
            .map_err(|e| {
                error!(key = %self.key, "Failed to read cache list: {}", e);
                CacheError::from(e)
            })?;

        rows.iter()
            .map(|row| -> Result<I> {
                let payload = get_string(row, "cache_list_items", "payload")?;
                Ok(serde_json::from_str(&payload)?)
            })
            .collect()
    }

    /// Timestamp of the last write to this list, or `None` once cleared.
    pub async fn timestamp(&self) -> Result<Option<i64>> {
        let row = self
            .cache
            .db
            .query_one_optional(
                "SELECT timestamp FROM cache_lists WHERE namespace = ? AND key = ?",
                &self.list_params(),
            )
            .await?;

        row.map(|row| get_i64(&row, "cache_lists", "timestamp"))
            .transpose()
    }
}

// ============================================================================
// Helper functions for extracting values from QueryRow
// ============================================================================

fn get_string(row: &QueryRow, table: &'static str, key: &str) -> Result<String> {
    row.get(key)
        .and_then(|value| value.as_string())
        .ok_or_else(|| CacheError::Corrupt {
            table,
            message: format!("Missing column: {}", key),
        })
}

fn get_i64(row: &QueryRow, table: &'static str, key: &str) -> Result<i64> {
    row.get(key)
        .and_then(|value| value.as_i64())
        .ok_or_else(|| CacheError::Corrupt {
            table,
            message: format!("Missing column: {}", key),
        })
}
