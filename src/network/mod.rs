//! Transport seam between the session manager and the registry.
//!
//! The session manager only talks to a [`Transport`]. The gRPC implementation
//! lives in [`grpc`]; tests plug in in-memory transports through the same
//! traits.
pub mod grpc;
mod seeds;

pub use seeds::*;

#[cfg(test)]
mod seeds_test;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;
use tonic::async_trait;

use crate::Member;
use crate::MemberUpdate;
use crate::Result;
use crate::Version;

/// Updates streamed by the registry after a successful subscribe.
///
/// An `Err(Error::Protocol(_))` item is a single malformed update and the
/// stream continues. Any other error ends the stream.
pub type UpdateStream = BoxStream<'static, Result<MemberUpdate>>;

/// Connectivity of the registry connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Establishing the first connection to a seed
    Connecting,
    /// Connected and healthy. Every transition into this state starts a new
    /// session: local members are re-registered and the update stream is
    /// re-opened.
    Ready,
    /// Connection lost. The transport keeps probing until it recovers.
    Disconnected,
    /// Closed by the application. Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A connection to one registry server.
///
/// Implementations bound every call by their own request deadlines and move
/// [`connectivity`](Transport::connectivity) away from `Ready` when a call
/// fails for transport reasons, so the session is rebuilt once the
/// connection recovers.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Registers a member owned by this client
    async fn register(
        &self,
        member: Member,
    ) -> Result<()>;

    async fn unregister(
        &self,
        id: String,
    ) -> Result<()>;

    /// Sends the metadata delta for a member owned by this client
    async fn update_metadata(
        &self,
        id: String,
        metadata: HashMap<String, String>,
    ) -> Result<()>;

    /// Opens the update stream. `known_versions` lets the registry skip
    /// members this client already holds at that version.
    async fn subscribe(
        &self,
        known_versions: HashMap<String, Version>,
    ) -> Result<UpdateStream>;

    /// Liveness heartbeat for every member owned by this client
    async fn heartbeat(&self) -> Result<()>;

    /// Watch of the current connectivity
    fn connectivity(&self) -> watch::Receiver<ConnectionState>;

    /// Releases the connection. Connectivity ends as `Closed`.
    async fn close(&self);
}

/// Opens transports to seed addresses
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects to `addr` and returns once the transport handshake
    /// completed
    async fn connect(
        &self,
        addr: String,
    ) -> Result<Arc<dyn Transport>>;
}
