//! Integration tests for the tokio-backed runtime facade.

use core_async::sync::{broadcast, CancellationToken, Mutex, Notify};
use core_async::{task, time};
use std::sync::Arc;

#[core_async::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    assert_eq!(handle.await.unwrap(), 42);
}

#[core_async::test]
async fn test_timeout_success() {
    let result = time::timeout(time::Duration::from_millis(100), async {
        time::sleep(time::Duration::from_millis(5)).await;
        42
    })
    .await;

    assert_eq!(result.unwrap(), 42);
}

#[core_async::test]
async fn test_timeout_failure() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(200)).await;
    })
    .await;

    assert!(result.is_err());
}

#[core_async::test]
async fn test_cancelling_parent_cancels_child_tokens() {
    let parent = CancellationToken::new();
    let child = parent.child_token();

    let waiter = task::spawn(async move {
        child.cancelled().await;
        true
    });

    parent.cancel();
    assert!(waiter.await.unwrap());
    assert!(parent.is_cancelled());
}

#[core_async::test]
async fn test_child_cancellation_leaves_parent_running() {
    let parent = CancellationToken::new();
    let child = parent.child_token();

    child.cancel();

    assert!(child.is_cancelled());
    assert!(!parent.is_cancelled());
}

#[core_async::test]
async fn test_select_against_cancellation() {
    let token = CancellationToken::new();
    token.cancel();

    let outcome = tokio_select(token).await;
    assert_eq!(outcome, "cancelled");
}

async fn tokio_select(token: CancellationToken) -> &'static str {
    let slow = time::sleep(time::Duration::from_secs(5));
    futures::pin_mut!(slow);
    let cancelled = token.cancelled();
    futures::pin_mut!(cancelled);
    match futures::future::select(slow, cancelled).await {
        futures::future::Either::Left(_) => "finished",
        futures::future::Either::Right(_) => "cancelled",
    }
}

#[core_async::test]
async fn test_mutex_shared_between_tasks() {
    let counter = Arc::new(Mutex::new(0));
    let mut handles = Vec::new();

    for _ in 0..8 {
        let counter = Arc::clone(&counter);
        handles.push(task::spawn(async move {
            *counter.lock().await += 1;
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*counter.lock().await, 8);
}

#[core_async::test]
async fn test_broadcast_delivers_to_every_receiver() {
    let (tx, mut rx1) = broadcast::channel(8);
    let mut rx2 = tx.subscribe();

    tx.send(7u32).unwrap();

    assert_eq!(rx1.recv().await.unwrap(), 7);
    assert_eq!(rx2.recv().await.unwrap(), 7);
}

#[core_async::test]
async fn test_notify_wakes_waiter() {
    let notify = Arc::new(Notify::new());
    let waiter = {
        let notify = Arc::clone(&notify);
        task::spawn(async move {
            notify.notified().await;
            "woken"
        })
    };

    task::yield_now().await;
    notify.notify_one();

    assert_eq!(waiter.await.unwrap(), "woken");
}
