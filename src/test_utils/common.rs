use std::collections::HashMap;
use std::time::Duration;

use nanoid::nanoid;
use rand::Rng;

use crate::Member;
use crate::Version;

pub(crate) fn random_metadata() -> HashMap<String, String> {
    (0..5).map(|_| (nanoid!(8), nanoid!(12))).collect()
}

pub(crate) fn random_member() -> Member {
    let mut rng = rand::thread_rng();
    Member {
        id: nanoid!(),
        service: nanoid!(8),
        locality: nanoid!(8),
        started: rng.gen_range(1..i64::MAX / 2),
        revision: nanoid!(8),
        metadata: random_metadata(),
    }
}

pub(crate) fn random_version() -> Version {
    Version::new(nanoid!(8), rand::thread_rng().gen_range(1..u64::MAX / 2))
}

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub(crate) fn enable_logger() {
    *LOGGER_INIT;
}

/// Polls `condition` until it holds, panicking after five seconds.
pub(crate) async fn wait_until<F>(
    what: &str,
    condition: F,
) where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
