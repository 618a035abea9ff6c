//! # Core Configuration Module
//!
//! Builder-based configuration for the feed sync core.
//!
//! ## Overview
//!
//! [`CoreConfig`] carries the settings every engine is created with: where
//! the cache database lives, default pagination filters, how long cached rows
//! survive, and how large the derived-artifact memo and event buffers are.
//! [`CoreConfigBuilder::build`] validates eagerly so a bad value is reported
//! at startup rather than on the first fetch.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/tmp/feeds.db")
//!     .page_size(50)
//!     .unread_only(true)
//!     .cache_max_age(Some(Duration::from_secs(3 * 24 * 60 * 60)))
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.page_size, 50);
//! ```
//!
//! ## Error Handling
//!
//! ```
//! use core_runtime::config::CoreConfig;
//!
//! let err = CoreConfig::builder().page_size(0).build().unwrap_err();
//! assert!(err.to_string().contains("Page size"));
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of items requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page a remote stream endpoint will honor.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Default age after which cached rows are evicted.
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default number of derived artifacts memoized per pipeline.
pub const DEFAULT_DERIVED_MEMO_CAPACITY: usize = 256;

/// Core configuration for the feed sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// SQLite database file for the offline cache; `None` keeps the cache in memory
    pub database_path: Option<PathBuf>,

    /// Number of items requested per page
    pub page_size: u32,

    /// Request only unread items by default
    pub unread_only: bool,

    /// Evict cache rows older than this after every cache write; `None` disables eviction
    pub cache_max_age: Option<Duration>,

    /// Capacity of the per-pipeline derived artifact memo
    pub derived_memo_capacity: usize,

    /// Per-subscriber buffer of each engine's event channel
    pub event_buffer_size: usize,

    pub features: FeatureFlags,

    pub logging: LoggingConfig,
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Persist fetched pages and serve them while offline
    pub offline_cache: bool,

    /// Resolve derived artifacts (entry playlists) after each fetch
    pub derived_resolution: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            offline_cache: true,
            derived_resolution: true,
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            unread_only: false,
            cache_max_age: Some(DEFAULT_CACHE_MAX_AGE),
            derived_memo_capacity: DEFAULT_DERIVED_MEMO_CAPACITY,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            features: FeatureFlags::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Database path, when set, is not empty
    /// - Page size is within `1..=MAX_PAGE_SIZE`
    /// - Cache max age, when set, is at least one second
    /// - Memo capacity and event buffer size are non-zero
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.page_size == 0 {
            return Err(Error::Config(
                "Page size must be greater than 0".to_string(),
            ));
        }

        if self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size exceeds maximum of {}",
                MAX_PAGE_SIZE
            )));
        }

        if let Some(max_age) = self.cache_max_age {
            if max_age < Duration::from_secs(1) {
                return Err(Error::Config(
                    "Cache max age must be at least one second. \
                     Use `cache_max_age(None)` to disable eviction."
                        .to_string(),
                ));
            }
        }

        if self.derived_memo_capacity == 0 {
            return Err(Error::Config(
                "Derived memo capacity must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    page_size: Option<u32>,
    unread_only: Option<bool>,
    cache_max_age: Option<Option<Duration>>,
    derived_memo_capacity: Option<usize>,
    event_buffer_size: Option<usize>,
    features: Option<FeatureFlags>,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    /// Sets the SQLite database file. Without one the cache lives in memory.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn unread_only(mut self, unread_only: bool) -> Self {
        self.unread_only = Some(unread_only);
        self
    }

    /// Sets the eviction age applied after cache writes. `None` disables eviction.
    pub fn cache_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.cache_max_age = Some(max_age);
        self
    }

    pub fn derived_memo_capacity(mut self, capacity: usize) -> Self {
        self.derived_memo_capacity = Some(capacity);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn enable_offline_cache(mut self, enable: bool) -> Self {
        self.features.get_or_insert_with(FeatureFlags::default).offline_cache = enable;
        self
    }

    pub fn enable_derived_resolution(mut self, enable: bool) -> Self {
        self.features
            .get_or_insert_with(FeatureFlags::default)
            .derived_resolution = enable;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<CoreConfig> {
        let defaults = CoreConfig::default();

        let config = CoreConfig {
            database_path: self.database_path,
            page_size: self.page_size.unwrap_or(defaults.page_size),
            unread_only: self.unread_only.unwrap_or(defaults.unread_only),
            cache_max_age: self.cache_max_age.unwrap_or(defaults.cache_max_age),
            derived_memo_capacity: self
                .derived_memo_capacity
                .unwrap_or(defaults.derived_memo_capacity),
            event_buffer_size: self.event_buffer_size.unwrap_or(defaults.event_buffer_size),
            features: self.features.unwrap_or(defaults.features),
            logging: self.logging.unwrap_or(defaults.logging),
        };

        config.validate()?;
        Ok(config)
    }
}
