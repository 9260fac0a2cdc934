use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use nanoid::nanoid;
use tokio::sync::watch;
use tracing::info;

use super::session::ConnectionStateCallback;
use super::session::Session;
use super::ClientConfig;
use super::ClientInner;
use super::Fuddle;
use crate::network::connect_seeds;
use crate::network::grpc::GrpcConnector;
use crate::network::ConnectionState;
use crate::network::Connector;
use crate::Filter;
use crate::Registry;
use crate::Result;

/// Configurable construction of a [`Fuddle`] client
pub struct FuddleBuilder {
    config: ClientConfig,
    seeds: Vec<String>,
    filter: Option<Filter>,
    on_state_change: Option<ConnectionStateCallback>,
    connector: Option<Arc<dyn Connector>>,
}

impl FuddleBuilder {
    /// Create a new builder with default config and the given seed addresses
    pub fn new(seeds: Vec<String>) -> Self {
        Self {
            config: ClientConfig::default(),
            seeds,
            filter: None,
            on_state_change: None,
            connector: None,
        }
    }

    /// Set the per-seed connection timeout (default: 1s)
    pub fn connect_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.connect_timeout_in_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the register/unregister/metadata request timeout (default: 3s)
    pub fn request_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.request_timeout_in_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the interval between heartbeats (default: 1s)
    pub fn heartbeat_interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.config.heartbeat_interval_in_ms = interval.as_millis() as u64;
        self
    }

    /// Set the deadline of a single heartbeat (default: 1s)
    pub fn heartbeat_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.heartbeat_timeout_in_ms = timeout.as_millis() as u64;
        self
    }

    /// Set how long close waits for local members to unregister (default: 1s)
    pub fn close_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.close_timeout_in_ms = timeout.as_millis() as u64;
        self
    }

    /// Default filter for [`Fuddle::members`] and [`Fuddle::subscribe`]
    /// when they are called without one
    pub fn filter(
        mut self,
        filter: Filter,
    ) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Called on every connection state change
    pub fn on_connection_state_change<F>(
        mut self,
        callback: F,
    ) -> Self
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(callback));
        self
    }

    /// Completely replaces the default configuration
    ///
    /// # Warning: Configuration Override
    /// This discards everything set through the individual methods such as
    /// [`connect_timeout`](FuddleBuilder::connect_timeout) before this call.
    pub fn set_config(
        mut self,
        config: ClientConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Replaces the gRPC transport, e.g. with an in-process registry
    pub fn connector(
        mut self,
        connector: Arc<dyn Connector>,
    ) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Connects to the first reachable seed and starts the session.
    ///
    /// # Errors
    /// - [`crate::ConnectError`] if the seed list is empty or no seed could be
    ///   reached. Connecting is not retried.
    /// - [`crate::Error::Config`] for an invalid configuration.
    pub async fn connect(self) -> Result<Fuddle> {
        self.config.validate()?;

        let client_id = nanoid!();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        if let Some(callback) = &self.on_state_change {
            callback(ConnectionState::Connecting);
        }

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(GrpcConnector::new(client_id.clone(), self.config.clone())),
        };
        let (seed, transport) =
            match connect_seeds(connector.as_ref(), &self.seeds, self.config.connect_timeout()).await {
                Ok(connected) => connected,
                Err(e) => {
                    if let Some(callback) = &self.on_state_change {
                        callback(ConnectionState::Disconnected);
                    }
                    return Err(e);
                }
            };
        info!(%client_id, %seed, "fuddle client connected");

        let registry = Registry::new();
        let session = Session::start(transport, registry.clone(), self.config, state, self.on_state_change);

        Ok(Fuddle {
            inner: Arc::new(ClientInner {
                client_id,
                seed,
                registry,
                session,
                default_filter: self.filter,
                closed: AtomicBool::new(false),
            }),
        })
    }
}
