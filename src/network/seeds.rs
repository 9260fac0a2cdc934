use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Connector;
use super::Transport;
use crate::utils::async_task::task_with_timeout;
use crate::ConnectError;
use crate::Result;
use crate::SeedFailure;

/// Connects to the first reachable seed.
///
/// Seeds are tried one at a time in random order so clients sharing a seed
/// list spread over the registry nodes. Each attempt is bounded by
/// `connect_timeout`. Returns the address that answered with its transport.
pub async fn connect_seeds(
    connector: &dyn Connector,
    seeds: &[String],
    connect_timeout: Duration,
) -> Result<(String, Arc<dyn Transport>)> {
    if seeds.is_empty() {
        return Err(ConnectError::NoSeeds.into());
    }

    let mut addrs = seeds.to_vec();
    addrs.shuffle(&mut rand::thread_rng());

    let mut failures = Vec::with_capacity(addrs.len());
    for addr in addrs {
        debug!(%addr, "connecting to seed");
        match task_with_timeout("connect", connect_timeout, connector.connect(addr.clone())).await {
            Ok(transport) => {
                info!(%addr, "connected to registry");
                return Ok((addr, transport));
            }
            Err(e) => {
                warn!(%addr, "failed to connect to seed: {}", e);
                failures.push(SeedFailure {
                    addr,
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(ConnectError::AllSeedsFailed { failures }.into())
}
