//! Async runtime facade for the feed sync core.
//!
//! Every other crate in the workspace reaches tokio through this crate, so the
//! runtime choice lives in exactly one `Cargo.toml`.
//!
//! # Modules
//!
//! - `task`: task spawning
//! - `time`: sleep, timeout, durations
//! - `sync`: async-aware locks, channels and cancellation tokens
//! - `runtime`: blocking entry point used by the attribute macros
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::task;
//!
//! # core_async::runtime::block_on(async {
//! let token = CancellationToken::new();
//! let child = token.child_token();
//! let handle = task::spawn(async move {
//!     child.cancelled().await;
//!     "stopped"
//! });
//! token.cancel();
//! assert_eq!(handle.await.unwrap(), "stopped");
//! # });
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use tokio::select;
pub use time::{sleep, Duration, Instant};
