//! Native SQLite Database Adapter
//!
//! Implements `DatabaseAdapter` with `sqlx` and the bundled SQLite driver.
//!
//! ## Features
//!
//! - Connection pooling with configurable limits
//! - WAL journal and a busy timeout so concurrent cache writers queue up
//! - Migrations from `core-cache/migrations`, applied by `initialize()`
//! - Atomic `execute_batch` backed by a real sqlx transaction

use async_trait::async_trait;
use bridge_traits::database::{DatabaseAdapter, DatabaseConfig, QueryRow, QueryValue};
use bridge_traits::error::{BridgeError, Result};
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Pool, Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Native SQLite implementation of DatabaseAdapter
pub struct SqliteAdapter {
    pool: Pool<Sqlite>,
}

impl SqliteAdapter {
    /// Open a connection pool for `config`.
    ///
    /// Migrations are not applied here; call `initialize()` before use.
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        info!(
            database_url = %config.database_url,
            max_connections = config.max_connections,
            "Creating SQLite database adapter"
        );

        let connect_options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| BridgeError::DatabaseError(format!("Invalid database URL: {}", e)))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true)
            .statement_cache_capacity(config.cache_capacity);

        let mut pool_options = SqlitePoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));

        // Recycling the only connection of an in-memory database drops its data.
        if config.is_in_memory() {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to create connection pool");
                BridgeError::DatabaseError(format!("Connection pool creation failed: {}", e))
            })?;

        debug!(connections = pool.size(), "SQLite connection pool created");

        Ok(Self { pool })
    }

    /// Wrap an already configured pool.
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Convert a sqlx row into a column-name keyed `QueryRow`.
    fn row_to_query_row(row: &SqliteRow) -> QueryRow {
        let mut result = HashMap::new();

        for column in row.columns() {
            let ordinal = column.ordinal();
            let value = if let Ok(v) = row.try_get::<Option<i64>, _>(ordinal) {
                v.map(QueryValue::Integer).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<f64>, _>(ordinal) {
                v.map(QueryValue::Real).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<String>, _>(ordinal) {
                v.map(QueryValue::Text).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(ordinal) {
                v.map(QueryValue::Blob).unwrap_or(QueryValue::Null)
            } else {
                QueryValue::Null
            };

            result.insert(column.name().to_string(), value);
        }

        result
    }

    fn bind_params<'q>(query: SqliteQuery<'q>, params: &'q [QueryValue]) -> SqliteQuery<'q> {
        params.iter().fold(query, |query, param| match param {
            QueryValue::Null => query.bind(None::<i64>),
            QueryValue::Integer(i) => query.bind(*i),
            QueryValue::Real(r) => query.bind(*r),
            QueryValue::Text(s) => query.bind(s.as_str()),
            QueryValue::Blob(b) => query.bind(b.as_slice()),
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        info!("Running cache migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Migration failed");
                BridgeError::DatabaseError(format!("Migration failed: {}", e))
            })?;

        debug!("Cache migrations completed");
        Ok(())
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn initialize(&mut self) -> Result<()> {
        self.run_migrations().await?;
        self.health_check().await?;

        info!("Database adapter initialized");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Database health check failed");
                BridgeError::DatabaseError(format!("Health check failed: {}", e))
            })?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing database connection pool");
        self.pool.close().await;
        Ok(())
    }

    async fn query(&self, query: &str, params: &[QueryValue]) -> Result<Vec<QueryRow>> {
        debug!(query = %query, param_count = params.len(), "Executing query");

        let rows = Self::bind_params(sqlx::query(query), params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(rows.iter().map(Self::row_to_query_row).collect())
    }

    async fn execute(&self, statement: &str, params: &[QueryValue]) -> Result<u64> {
        debug!(statement = %statement, param_count = params.len(), "Executing statement");

        let result = Self::bind_params(sqlx::query(statement), params)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Execute failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn query_one_optional(
        &self,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Option<QueryRow>> {
        debug!(query = %query, param_count = params.len(), "Executing query_one_optional");

        let row = Self::bind_params(sqlx::query(query), params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Query one optional failed: {}", e)))?;

        Ok(row.as_ref().map(Self::row_to_query_row))
    }

    async fn execute_batch(&self, statements: &[(&str, Vec<QueryValue>)]) -> Result<Vec<u64>> {
        debug!(batch_size = statements.len(), "Executing batch");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Begin transaction failed: {}", e)))?;

        let mut results = Vec::with_capacity(statements.len());
        for (statement, params) in statements {
            // Dropping `tx` on the error path rolls the whole batch back.
            let done = Self::bind_params(sqlx::query(statement), params)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    warn!(error = %e, statement = %statement, "Batch statement failed");
                    BridgeError::DatabaseError(format!("Batch statement failed: {}", e))
                })?;
            results.push(done.rows_affected());
        }

        tx.commit()
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Commit transaction failed: {}", e)))?;

        debug!(results = ?results, "Batch committed");
        Ok(results)
    }
}
