//! gRPC transport against the `fuddle.Registry` service
//!
//! Every RPC carries the configured request deadline. Connectivity is driven
//! by a background health probe, plus any RPC or stream failure observed on
//! the channel.

mod grpc_transport;
mod health_probe;

pub use grpc_transport::*;
pub(crate) use health_probe::*;


use std::sync::Arc;

use tonic::async_trait;

use super::Connector;
use super::Transport;
use crate::ClientConfig;
use crate::Result;

/// Opens [`GrpcTransport`]s for one client
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    client_id: String,
    config: ClientConfig,
}

impl GrpcConnector {
    pub fn new(
        client_id: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            config,
        }
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(
        &self,
        addr: String,
    ) -> Result<Arc<dyn Transport>> {
        let transport = GrpcTransport::connect(&addr, &self.client_id, &self.config).await?;
        Ok(Arc::new(transport))
    }
}

/// Seeds are usually plain `host:port`. tonic needs a URI.
pub(crate) fn endpoint_uri(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}
