use std::sync::Arc;
use std::time::Duration;

use tonic::async_trait;

use super::*;
use crate::test_utils::FakeConnector;
use crate::test_utils::FakeTransport;
use crate::ConnectError;
use crate::Error;
use crate::Result;

fn seeds(addrs: &[&str]) -> Vec<String> {
    addrs.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_connect_seeds_empty_list_fails() {
    let connector = FakeConnector::new();

    let result = connect_seeds(&connector, &[], Duration::from_secs(1)).await;

    assert!(matches!(result, Err(Error::Connect(ConnectError::NoSeeds))));
    assert!(connector.attempts().is_empty());
}

#[tokio::test]
async fn test_connect_seeds_all_unreachable_reports_every_seed() {
    let connector = FakeConnector::new();
    let addrs = seeds(&["10.0.0.1:8220", "10.0.0.2:8220", "10.0.0.3:8220"]);

    let result = connect_seeds(&connector, &addrs, Duration::from_secs(1)).await;

    match result {
        Err(Error::Connect(ConnectError::AllSeedsFailed { failures })) => {
            let mut failed: Vec<String> = failures.into_iter().map(|f| f.addr).collect();
            failed.sort();
            assert_eq!(failed, addrs);
        }
        Err(e) => panic!("unexpected error: {e:?}"),
        Ok(_) => panic!("connect should fail"),
    }
    assert_eq!(connector.attempts().len(), 3);
}

#[tokio::test]
async fn test_connect_seeds_skips_unreachable_seed() {
    let transport = FakeTransport::new();
    let connector = FakeConnector::new().with_transport("10.0.0.2:8220", transport);
    let addrs = seeds(&["10.0.0.1:8220", "10.0.0.2:8220", "10.0.0.3:8220"]);

    let (addr, _transport) = connect_seeds(&connector, &addrs, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(addr, "10.0.0.2:8220");
    // Stops at the first seed that answers
    assert_eq!(connector.attempts().last().map(String::as_str), Some("10.0.0.2:8220"));
}

#[tokio::test]
async fn test_connect_seeds_tries_seeds_in_random_order() {
    let addrs: Vec<String> = (0..8).map(|i| format!("10.0.0.{i}:8220")).collect();

    // The probability that 20 shuffles of 8 seeds all keep the given order is
    // negligible.
    let mut saw_other_order = false;
    for _ in 0..20 {
        let connector = FakeConnector::new();
        let _ = connect_seeds(&connector, &addrs, Duration::from_secs(1)).await;
        let attempts = connector.attempts();

        let mut sorted = attempts.clone();
        sorted.sort();
        let mut expected = addrs.clone();
        expected.sort();
        assert_eq!(sorted, expected, "each seed is tried exactly once");

        if attempts != addrs {
            saw_other_order = true;
        }
    }
    assert!(saw_other_order);
}

struct HangingConnector;

#[async_trait]
impl Connector for HangingConnector {
    async fn connect(
        &self,
        _addr: String,
    ) -> Result<Arc<dyn Transport>> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_seeds_bounds_each_attempt() {
    let addrs = seeds(&["10.0.0.1:8220", "10.0.0.2:8220"]);

    let result = connect_seeds(&HangingConnector, &addrs, Duration::from_millis(200)).await;

    match result {
        Err(Error::Connect(ConnectError::AllSeedsFailed { failures })) => {
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().all(|f| f.reason.contains("timed out")));
        }
        Err(e) => panic!("unexpected error: {e:?}"),
        Ok(_) => panic!("connect should fail"),
    }
}

#[tokio::test]
async fn test_connect_seeds_with_mock_connector() {
    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .times(1)
        .returning(|_| Ok(FakeTransport::new() as Arc<dyn Transport>));

    let (addr, transport) = connect_seeds(&connector, &seeds(&["127.0.0.1:8220"]), Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(addr, "127.0.0.1:8220");
    assert_eq!(*transport.connectivity().borrow(), ConnectionState::Ready);
}
