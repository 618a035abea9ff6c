//! Cache store: owns the database adapter and hands out typed namespaces.

use crate::adapters::SqliteAdapter;
use crate::error::Result;
use crate::ttl::{Identifiable, TtlCache};
use bridge_traits::database::{DatabaseAdapter, DatabaseConfig};
use bridge_traits::time::{Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Shared entry point to the cache database.
///
/// Every [`TtlCache`] handed out by [`CacheStore::namespace`] shares this
/// store's adapter and clock. Namespaces with different names never see each
/// other's rows.
#[derive(Clone)]
pub struct CacheStore {
    db: Arc<dyn DatabaseAdapter>,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Opens (or creates) the SQLite database described by `config` and
    /// applies the cache migrations.
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        let mut adapter = SqliteAdapter::new(config).await?;
        adapter.initialize().await?;

        info!("Cache store opened");
        Ok(Self::new(Arc::new(adapter), Arc::new(SystemClock)))
    }

    /// Wraps an already initialized adapter.
    pub fn new(db: Arc<dyn DatabaseAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace<I>(&self, name: impl Into<String>) -> TtlCache<I>
    where
        I: Identifiable + Serialize + DeserializeOwned + Send + Sync,
    {
        TtlCache::new(Arc::clone(&self.db), name, Arc::clone(&self.clock))
    }

    pub fn adapter(&self) -> Arc<dyn DatabaseAdapter> {
        Arc::clone(&self.db)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub async fn close(&self) -> Result<()> {
        self.db.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}
