//! Task spawning.

pub use tokio::task::{yield_now, JoinError, JoinHandle};

/// Spawns a task onto the current Tokio runtime.
///
/// Must be called from within a runtime context (an `async fn` driven by
/// `#[core_async::test]`, `#[core_async::main]` or [`crate::runtime::block_on`]).
///
/// ```rust
/// use core_async::task::spawn;
///
/// # core_async::runtime::block_on(async {
/// let handle = spawn(async { 21 * 2 });
/// assert_eq!(handle.await.unwrap(), 42);
/// # });
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}
