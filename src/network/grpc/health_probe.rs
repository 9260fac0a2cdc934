use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::network::ConnectionState;
use crate::utils::async_task::task_with_timeout;
use crate::BackoffPolicy;
use crate::Error;
use crate::NetworkError;
use crate::Result;

/// Overall server health as reported by the standard gRPC health service
pub(crate) const SERVER_HEALTH_SERVICE: &str = "";

/// Moves `Ready` to `Disconnected`. Returns true if the state changed.
pub(crate) fn mark_disconnected(state: &watch::Sender<ConnectionState>) -> bool {
    state.send_if_modified(|s| {
        if *s == ConnectionState::Ready {
            *s = ConnectionState::Disconnected;
            true
        } else {
            false
        }
    })
}

/// Moves any non-terminal state to `Ready`. Returns true if the state changed.
pub(crate) fn mark_ready(state: &watch::Sender<ConnectionState>) -> bool {
    state.send_if_modified(|s| match *s {
        ConnectionState::Connecting | ConnectionState::Disconnected => {
            *s = ConnectionState::Ready;
            true
        }
        ConnectionState::Ready | ConnectionState::Closed => false,
    })
}

/// Periodically checks the registry through `grpc.health.v1.Health`.
///
/// While healthy the probe runs every `interval`. After a failure it backs
/// off exponentially per `policy` until a probe succeeds, and gives up once
/// the policy is exhausted.
pub(crate) struct HealthProbe {
    client: HealthClient<Channel>,
    interval: Duration,
    policy: BackoffPolicy,
    state: watch::Sender<ConnectionState>,
}

impl HealthProbe {
    pub(crate) fn new(
        channel: Channel,
        interval: Duration,
        policy: BackoffPolicy,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            client: HealthClient::new(channel),
            interval,
            policy,
            state,
        }
    }

    pub(crate) async fn run(
        mut self,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut failures = 0usize;
        loop {
            let delay = if failures == 0 {
                self.interval
            } else {
                self.policy.delay_for(failures)
            };

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }

            match self.check().await {
                Ok(()) => {
                    if failures > 0 {
                        info!(failures, "registry connection recovered");
                    }
                    failures = 0;
                    mark_ready(&self.state);
                }
                Err(e) => {
                    failures += 1;
                    if mark_disconnected(&self.state) {
                        warn!("registry connection lost: {}", e);
                    } else {
                        debug!(failures, "registry still unreachable: {}", e);
                    }

                    if self.policy.exhausted(failures) {
                        error!(failures, "giving up on registry connection");
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn check(&mut self) -> Result<()> {
        let request = HealthCheckRequest {
            service: SERVER_HEALTH_SERVICE.to_string(),
        };
        let client = &mut self.client;
        let response = task_with_timeout("health_check", self.policy.timeout(), async move {
            client.check(request).await.map_err(Error::from)
        })
        .await?;

        if response.into_inner().status == ServingStatus::Serving as i32 {
            Ok(())
        } else {
            Err(NetworkError::ServiceUnavailable("registry is not serving".to_string()).into())
        }
    }
}
