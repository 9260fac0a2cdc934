//! Client session against a fuddle registry
//!
//! Provides the public entry points:
//! - [`Fuddle`] - Connection handle holding the local replica of the cluster
//! - [`FuddleBuilder`] - Configurable connection
//! - [`LocalMember`] - Handle to a member registered by this client
//!
//! # Basic Usage
//! ```no_run
//! use fuddle::{Filter, Fuddle, Member, ServiceFilter};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let client = Fuddle::builder(vec![
//!         "10.26.104.52:8220".into(),
//!         "10.26.104.53:8220".into(),
//!     ])
//!     .connect_timeout(Duration::from_secs(2))
//!     .heartbeat_interval(Duration::from_millis(500))
//!     .connect()
//!     .await
//!     .unwrap();
//!
//!     let local = client
//!         .register(
//!             Member::new("orders-32eaba4e", "orders")
//!                 .with_locality("aws.us-east-1-b")
//!                 .with_metadata([("status", "booting")]),
//!         )
//!         .await
//!         .unwrap();
//!
//!     let filter = Filter::new().with_service(
//!         "order*",
//!         ServiceFilter::new().with_metadata("status", ["active"]),
//!     );
//!     let _sub = client.subscribe(
//!         |members| println!("{} active order services", members.len()),
//!         Some(filter),
//!     );
//!
//!     local.update_metadata([("status", "active")]).await.unwrap();
//!
//!     client.close().await;
//! }
//! ```

mod builder;
mod config;
mod local_member;
mod scoped_timer;
mod session;

pub use builder::*;
pub use config::*;
pub use local_member::*;
pub use session::ConnectionStateCallback;


use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use tracing::warn;

use crate::network::ConnectionState;
use crate::Error;
use crate::Filter;
use crate::Member;
use crate::Registry;
use crate::Result;
use crate::Subscription;
use scoped_timer::ScopedTimer;
use session::Session;

/// Connection to a fuddle registry
///
/// Holds an eventually consistent replica of every member in the cluster and
/// keeps the members registered through it alive. The replica is updated in
/// the background and can be read or subscribed to at any time, including
/// while the connection is down.
///
/// Created through [`Fuddle::connect`] or [`Fuddle::builder`]. Cloning is
/// cheap and every clone shares the same session. Call
/// [`close`](Fuddle::close) before exiting so the registry sees the local
/// members leave instead of failing.
#[derive(Clone)]
pub struct Fuddle {
    pub(super) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(super) client_id: String,
    pub(super) seed: String,
    pub(super) registry: Registry,
    pub(super) session: Arc<Session>,
    pub(super) default_filter: Option<Filter>,
    pub(super) closed: AtomicBool,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            warn!(client_id = %self.client_id, "client dropped without close, local members will be marked failed");
            self.session.abort();
        }
    }
}

impl Fuddle {
    /// Create a configured client builder
    pub fn builder(seeds: Vec<String>) -> FuddleBuilder {
        FuddleBuilder::new(seeds)
    }

    /// Connects with the default configuration
    pub async fn connect(seeds: Vec<String>) -> Result<Self> {
        FuddleBuilder::new(seeds).connect().await
    }

    /// Random id identifying this client to the registry
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Seed address the session was established with
    pub fn seed(&self) -> &str {
        &self.inner.seed
    }

    /// Registers a member owned by this client.
    ///
    /// The member is visible locally as soon as this returns, even if the
    /// registry could not be reached; it is registered again on every
    /// reconnect. Registering an id this client already owns replaces it.
    ///
    /// # Errors
    /// - [`Error::Rejected`] if the registry refused the member. Nothing is
    ///   stored locally in that case.
    /// - [`Error::Closed`] after [`close`](Fuddle::close), including when the
    ///   client was closed while the registration was in flight. The member
    ///   is unregistered again on a best-effort basis in that case.
    pub async fn register(
        &self,
        member: Member,
    ) -> Result<LocalMember> {
        self.inner.ensure_open()?;
        let id = member.id.clone();

        {
            let _timer = ScopedTimer::new("register", &id);
            let sent = self.inner.session.transport().register(member.clone()).await;
            self.inner.tolerate_unavailable("register", &id, sent)?;
        }

        self.inner.registry.register_local(member);

        // Close may have started while the RPC was in flight and already
        // taken its list of members to unregister.
        if self.inner.closed.load(Ordering::Acquire) {
            self.inner.registry.unregister_local(&id);
            warn!(member = %id, "client closed during register, unregistering member");
            if let Err(e) = self.inner.session.transport().unregister(id.clone()).await {
                warn!(member = %id, "failed to unregister after close: {}", e);
            }
            return Err(Error::Closed);
        }

        info!(member = %id, "registered local member");
        Ok(LocalMember::new(id, self.inner.clone()))
    }

    /// Members matching `filter`, or the client's default filter when
    /// `None`. Without either every member is returned, local ones included.
    pub fn members(
        &self,
        filter: Option<&Filter>,
    ) -> Vec<Member> {
        self.inner
            .registry
            .members(filter.or(self.inner.default_filter.as_ref()))
    }

    /// Looks up a single member by id
    pub fn member(
        &self,
        id: &str,
    ) -> Option<Member> {
        self.inner.registry.member(id)
    }

    /// Members registered through this client
    pub fn local_members(&self) -> Vec<Member> {
        self.inner.registry.local_members()
    }

    /// Calls `callback` with the matching members now and after every change.
    ///
    /// The first call happens before this returns. `filter` falls back to the
    /// client's default filter when `None`. The callback runs on whichever
    /// thread applied the change, never while internal locks are held, so it
    /// may read the client or unsubscribe.
    pub fn subscribe<F>(
        &self,
        callback: F,
        filter: Option<Filter>,
    ) -> Subscription
    where
        F: Fn(Vec<Member>) + Send + Sync + 'static,
    {
        let filter = filter.or_else(|| self.inner.default_filter.clone());
        self.inner.registry.subscribe(callback, filter)
    }

    /// The local replica
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.session.state()
    }

    /// Watch of the connection state
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.session.watch_state()
    }

    /// Unregisters the local members and closes the session.
    ///
    /// Waits for all background tasks to stop, so no subscriber or state
    /// callback fires once this returns. Calling it again has no effect.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(client_id = %self.inner.client_id, "closing client");
        self.inner.session.shutdown().await;
    }
}

impl ClientInner {
    pub(super) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Write path policy: a rejection is returned to the caller, any other
    /// failure is logged and the write still applies locally.
    pub(super) fn tolerate_unavailable(
        &self,
        request_type: &'static str,
        member_id: &str,
        result: Result<()>,
    ) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_rejection() => {
                warn!(member = %member_id, request_type, "registry rejected request: {}", e);
                Err(e)
            }
            Err(e) => {
                warn!(
                    member = %member_id,
                    request_type,
                    "registry unreachable, applying locally until reconnect: {}",
                    e
                );
                Ok(())
            }
        }
    }
}
