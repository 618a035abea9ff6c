//! Synchronization primitives.
//!
//! Async-aware locks and channels from `tokio::sync`, plus the
//! [`CancellationToken`] used to tear down fetches and resolution workers.
//!
//! Locks from this module may be held across `.await`. Short critical sections
//! that never suspend are better served by `parking_lot`.
//!
//! ```rust
//! use core_async::sync::{broadcast, Mutex};
//!
//! # core_async::runtime::block_on(async {
//! let counter = Mutex::new(0);
//! *counter.lock().await += 1;
//!
//! let (tx, mut rx) = broadcast::channel(4);
//! tx.send("event").unwrap();
//! assert_eq!(rx.recv().await.unwrap(), "event");
//! # });
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
