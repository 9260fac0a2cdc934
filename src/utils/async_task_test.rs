use std::time::Duration;

use tokio_util::task::TaskTracker;

use super::async_task::spawn_task;
use super::async_task::task_with_timeout;
use crate::Error;
use crate::NetworkError;

#[tokio::test]
async fn test_task_with_timeout_returns_result() {
    let r = task_with_timeout("test", Duration::from_millis(100), async { Ok(7) }).await;
    assert_eq!(r.unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_task_with_timeout_expires() {
    let r: crate::Result<()> = task_with_timeout("test", Duration::from_millis(100), async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(())
    })
    .await;

    match r {
        Err(Error::Network(NetworkError::Timeout { request_type, duration })) => {
            assert_eq!(request_type, "test");
            assert_eq!(duration, Duration::from_millis(100));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_spawn_task_is_tracked() {
    let tracker = TaskTracker::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    spawn_task("test", &tracker, move || async move {
        tx.send(()).ok();
        Ok(())
    });
    tracker.close();
    tracker.wait().await;
    assert!(rx.await.is_ok());
}
