use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tonic::async_trait;
use tonic::codec::CompressionEncoding;
use tonic::codec::Streaming;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::Status;
use tracing::debug;
use tracing::warn;

use super::endpoint_uri;
use super::mark_disconnected;
use super::HealthProbe;
use crate::network::ConnectionState;
use crate::network::Transport;
use crate::network::UpdateStream;
use crate::proto;
use crate::proto::registry_client::RegistryClient;
use crate::utils::async_task::spawn_task;
use crate::ClientConfig;
use crate::Error;
use crate::Member;
use crate::MemberUpdate;
use crate::NetworkError;
use crate::Result;
use crate::Version;

/// Connection to one registry node over gRPC.
///
/// Clones of the underlying tonic channel are cheap, so each RPC works on
/// its own client handle.
pub struct GrpcTransport {
    addr: String,
    client_id: String,
    client: RegistryClient<Channel>,
    heartbeat_timeout: Duration,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl GrpcTransport {
    /// Opens the channel and starts the health probe.
    ///
    /// Returns once the HTTP/2 handshake with `addr` completed.
    pub async fn connect(
        addr: &str,
        client_id: &str,
        config: &ClientConfig,
    ) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint_uri(addr))
            .map_err(|_| NetworkError::InvalidURI(addr.to_string()))?
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .tcp_keepalive(Some(Duration::from_secs(config.tcp_keepalive_in_secs)))
            .http2_keep_alive_interval(Duration::from_secs(config.http2_keep_alive_interval_in_secs))
            .keep_alive_timeout(Duration::from_secs(config.http2_keep_alive_timeout_in_secs))
            .connect()
            .await?;

        let mut client = RegistryClient::new(channel.clone());
        if config.enable_compression {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }

        let (state, _) = watch::channel(ConnectionState::Ready);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let probe = HealthProbe::new(
            channel,
            config.health_check_interval(),
            config.reconnect,
            state.clone(),
        );
        let token = cancel.clone();
        spawn_task("health_probe", &tracker, move || probe.run(token));

        debug!(%addr, client_id, "grpc transport connected");
        Ok(Self {
            addr: addr.to_string(),
            client_id: client_id.to_string(),
            client,
            heartbeat_timeout: config.heartbeat_timeout(),
            state,
            cancel,
            tracker,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Returns false once the health probe gave up or was stopped
    #[cfg(test)]
    pub(crate) fn health_probe_running(&self) -> bool {
        !self.tracker.is_empty()
    }

    /// Converts an RPC failure, marking the connection lost unless the
    /// registry answered with a decision.
    fn rpc_error(
        &self,
        request_type: &'static str,
        status: Status,
    ) -> Error {
        let e = Error::from(status);
        if !e.is_rejection() && mark_disconnected(&self.state) {
            warn!(addr = %self.addr, request_type, "rpc failed, connection marked lost: {}", e);
        }
        e
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn register(
        &self,
        member: Member,
    ) -> Result<()> {
        let request = proto::RegisterRequest {
            member: Some(proto::Member::from_local(member, &self.client_id)),
        };
        let mut client = self.client.clone();
        client
            .register(request)
            .await
            .map_err(|s| self.rpc_error("register", s))?;
        Ok(())
    }

    async fn unregister(
        &self,
        id: String,
    ) -> Result<()> {
        let request = proto::UnregisterRequest {
            client_id: self.client_id.clone(),
            id,
        };
        let mut client = self.client.clone();
        client
            .unregister(request)
            .await
            .map_err(|s| self.rpc_error("unregister", s))?;
        Ok(())
    }

    async fn update_metadata(
        &self,
        id: String,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let request = proto::UpdateMetadataRequest {
            client_id: self.client_id.clone(),
            id,
            metadata,
        };
        let mut client = self.client.clone();
        client
            .update_metadata(request)
            .await
            .map_err(|s| self.rpc_error("update_metadata", s))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        known_versions: HashMap<String, Version>,
    ) -> Result<UpdateStream> {
        let request = proto::SubscribeRequest::new(&self.client_id, known_versions);
        let mut client = self.client.clone();
        let stream = client
            .subscribe(request)
            .await
            .map_err(|s| self.rpc_error("subscribe", s))?
            .into_inner();

        Ok(decode_updates(stream, self.state.clone()))
    }

    async fn heartbeat(&self) -> Result<()> {
        let mut request = tonic::Request::new(proto::HeartbeatRequest {
            client_id: self.client_id.clone(),
        });
        request.set_timeout(self.heartbeat_timeout);

        let mut client = self.client.clone();
        client
            .heartbeat(request)
            .await
            .map_err(|s| self.rpc_error("heartbeat", s))?;
        Ok(())
    }

    fn connectivity(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn close(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.state.send_replace(ConnectionState::Closed);
        debug!(addr = %self.addr, "grpc transport closed");
    }
}

impl Drop for GrpcTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Turns the raw gRPC stream into domain updates.
///
/// A malformed update is yielded as a protocol error and the stream goes on.
/// The stream ends after the first transport error or when the server closes
/// it, and the connection is marked lost so the session is rebuilt on the
/// next successful probe.
fn decode_updates(
    stream: Streaming<proto::MemberUpdate>,
    state: watch::Sender<ConnectionState>,
) -> UpdateStream {
    futures::stream::unfold(Some((stream, state)), |next| async move {
        let Some((mut stream, state)) = next else {
            return None;
        };
        match stream.message().await {
            Ok(Some(update)) => {
                let update = MemberUpdate::try_from(update).map_err(Error::from);
                Some((update, Some((stream, state))))
            }
            Ok(None) => {
                mark_disconnected(&state);
                let e = NetworkError::StreamTerminated("closed by registry".to_string());
                Some((Err(e.into()), None))
            }
            Err(status) => {
                mark_disconnected(&state);
                let e = NetworkError::StreamTerminated(status.message().to_string());
                Some((Err(e.into()), None))
            }
        }
    })
    .boxed()
}
