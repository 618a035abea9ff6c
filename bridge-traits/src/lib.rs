//! # Host Bridge Traits
//!
//! Capabilities the feed sync core needs from its host, expressed as traits so
//! the core never hard-codes a storage driver, wall clock or log pipeline.
//!
//! ## Traits
//!
//! - [`DatabaseAdapter`](database::DatabaseAdapter) - transactional SQL store backing the TTL cache
//! - [`Clock`](time::Clock) - time source for cache timestamps and watermarks
//! - [`LoggerSink`](time::LoggerSink) - forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert driver-specific failures into it with an actionable message.
//!
//! ## Thread Safety
//!
//! Every bridge trait requires `Send + Sync` so a single adapter can be shared
//! by engines running on different tasks.

pub mod database;
pub mod error;
pub mod time;

pub use database::{DatabaseAdapter, DatabaseConfig, QueryRow, QueryValue};
pub use error::BridgeError;
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
