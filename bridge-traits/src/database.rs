//! Database Abstraction Layer
//!
//! The TTL cache talks to its backing store only through [`DatabaseAdapter`].
//! The native implementation lives in `core-cache` (`SqliteAdapter`, sqlx);
//! tests and hosts may substitute their own.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::database::{DatabaseAdapter, DatabaseConfig, QueryValue};
//!
//! let mut adapter = SqliteAdapter::new(DatabaseConfig::in_memory()).await?;
//! adapter.initialize().await?;
//!
//! let rows = adapter
//!     .query("SELECT payload FROM cache_entries WHERE id = ?", &["entry-1".into()])
//!     .await?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration for adapter initialization
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path or connection string
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,

    /// Statement cache capacity per connection
    pub cache_capacity: usize,
}

impl DatabaseConfig {
    /// Create a new database configuration with the given file path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();

        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout_secs: 30,
            cache_capacity: 100,
        }
    }

    /// Create a configuration for an in-memory database.
    ///
    /// Every SQLite in-memory connection is a separate database, so the pool
    /// is pinned to a single connection.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout_secs: 30,
            cache_capacity: 100,
        }
    }

    /// Whether this configuration points at an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

// =============================================================================
// Query Result Types
// =============================================================================

/// Represents a single row from a database query as a map of column names to values
pub type QueryRow = std::collections::HashMap<String, QueryValue>;

/// Represents a database value that can be null, integer, real, text, or blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl QueryValue {
    /// Convert to i64 if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            QueryValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to &str if possible
    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Convert to String (owned) if possible
    pub fn as_string(&self) -> Option<String> {
        self.as_str().map(str::to_string)
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, QueryValue::Null)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(QueryValue::Null)
    }
}

// =============================================================================
// Database Adapter Trait
// =============================================================================

/// Database adapter trait used by the cache layer.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; a single adapter is shared by every
/// cache namespace and every engine that writes through to it.
///
/// ## Transactions
///
/// [`execute_batch`](DatabaseAdapter::execute_batch) is the only transactional
/// entry point. It must be atomic: either every statement applies or none does.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Initialize the database connection and run migrations
    async fn initialize(&mut self) -> Result<()>;

    /// Check if the database connection is healthy
    async fn health_check(&self) -> Result<()>;

    /// Close all database connections. Later calls fail with a database error.
    async fn close(&self) -> Result<()>;

    // =========================================================================
    // Raw Query Execution
    // =========================================================================

    /// Execute a SQL query with positional parameters and return every row
    async fn query(&self, query: &str, params: &[QueryValue]) -> Result<Vec<QueryRow>>;

    /// Execute a SQL statement that doesn't return rows and report rows affected
    async fn execute(&self, statement: &str, params: &[QueryValue]) -> Result<u64>;

    /// Execute a query expected to return zero or one row
    async fn query_one_optional(
        &self,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Option<QueryRow>>;

    // =========================================================================
    // Batch Operations
    // =========================================================================

    /// Execute several statements inside one transaction.
    ///
    /// Returns the rows affected per statement. If any statement fails the
    /// transaction is rolled back and the error is returned.
    async fn execute_batch(&self, statements: &[(&str, Vec<QueryValue>)]) -> Result<Vec<u64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_value_conversions() {
        let int_val = QueryValue::Integer(42);
        assert_eq!(int_val.as_i64(), Some(42));
        assert!(int_val.as_str().is_none());

        let text_val = QueryValue::Text("hello".to_string());
        assert_eq!(text_val.as_str(), Some("hello"));
        assert_eq!(text_val.as_string(), Some("hello".to_string()));
        assert!(text_val.as_i64().is_none());

        let null_val = QueryValue::Null;
        assert!(null_val.is_null());
        assert!(null_val.as_i64().is_none());
    }

    #[test]
    fn test_query_value_from_impls() {
        assert_eq!(QueryValue::from(7i64), QueryValue::Integer(7));
        assert_eq!(QueryValue::from("feed"), QueryValue::Text("feed".into()));
        assert_eq!(QueryValue::from(None::<i64>), QueryValue::Null);
        assert_eq!(
            QueryValue::from(Some("tok".to_string())),
            QueryValue::Text("tok".into())
        );
    }

    #[test]
    fn test_in_memory_config_uses_single_connection() {
        let config = DatabaseConfig::in_memory();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_connections, 1);
        assert!(config.is_in_memory());
    }

    #[test]
    fn test_database_config_from_path() {
        let config = DatabaseConfig::new("feeds.db");
        assert!(config.database_url.ends_with("feeds.db"));
        assert!(!config.is_in_memory());
        assert_eq!(config.max_connections, 5);
    }
}
