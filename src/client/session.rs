use std::sync::Arc;

use futures::future::join_all;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::scoped_timer::ScopedTimer;
use super::ClientConfig;
use crate::network::ConnectionState;
use crate::network::Transport;
use crate::utils::async_task::spawn_task;
use crate::utils::async_task::task_with_timeout;
use crate::Error;
use crate::Registry;
use crate::Result;

/// Callback fired on every connection state change
pub type ConnectionStateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync + 'static>;

/// Drives the registry session over one transport.
///
/// Each time the transport becomes ready a new epoch starts: local members are
/// registered again, the update stream is opened with the known versions and
/// heartbeats begin. The epoch's tasks stop when the transport leaves `Ready`
/// or one of them fails, and the next `Ready` starts a fresh epoch.
pub(crate) struct Session {
    transport: Arc<dyn Transport>,
    registry: Registry,
    config: ClientConfig,
    state: watch::Sender<ConnectionState>,
    on_state_change: Option<ConnectionStateCallback>,
    broken_tx: mpsc::UnboundedSender<u64>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

struct Epoch {
    id: u64,
    token: CancellationToken,
}

impl Session {
    pub(crate) fn start(
        transport: Arc<dyn Transport>,
        registry: Registry,
        config: ClientConfig,
        state: watch::Sender<ConnectionState>,
        on_state_change: Option<ConnectionStateCallback>,
    ) -> Arc<Self> {
        let (broken_tx, broken_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            transport,
            registry,
            config,
            state,
            on_state_change,
            broken_tx,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        let watcher = session.clone();
        spawn_task("connectivity_watcher", &session.tracker, move || {
            watcher.watch_connectivity(broken_rx)
        });
        session
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Publishes `next` unless the session is already closed
    fn set_state(
        &self,
        next: ConnectionState,
    ) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next || *current == ConnectionState::Closed {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(state = %next, "registry connection state changed");
            if let Some(callback) = &self.on_state_change {
                callback(next);
            }
        }
    }

    async fn watch_connectivity(
        self: Arc<Self>,
        mut broken_rx: mpsc::UnboundedReceiver<u64>,
    ) -> Result<()> {
        let mut connectivity = self.transport.connectivity();
        let mut epoch: Option<Epoch> = None;
        let mut next_id = 0u64;

        loop {
            let current = *connectivity.borrow_and_update();
            match current {
                ConnectionState::Ready => {
                    if epoch.is_none() {
                        next_id += 1;
                        epoch = Some(self.begin_epoch(next_id));
                    }
                }
                ConnectionState::Closed => {
                    debug!("transport closed, stopping connectivity watcher");
                    break;
                }
                other => {
                    if let Some(e) = epoch.take() {
                        e.token.cancel();
                    }
                    self.set_state(other);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(id) = broken_rx.recv() => {
                    if epoch.as_ref().map(|e| e.id) == Some(id) {
                        if let Some(e) = epoch.take() {
                            e.token.cancel();
                        }
                        // Restart the session after a pause if the transport
                        // still reports ready.
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.config.reconnect.delay_for(1)) => {}
                        }
                    }
                }
            }
        }

        if let Some(e) = epoch.take() {
            e.token.cancel();
        }
        Ok(())
    }

    fn begin_epoch(
        self: &Arc<Self>,
        id: u64,
    ) -> Epoch {
        let token = self.cancel.child_token();
        self.set_state(ConnectionState::Ready);
        debug!(epoch = id, "starting registry session");

        let session = self.clone();
        let epoch_token = token.clone();
        spawn_task("update_stream", &self.tracker, move || {
            session.run_epoch(id, epoch_token)
        });

        Epoch { id, token }
    }

    async fn run_epoch(
        self: Arc<Self>,
        id: u64,
        token: CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = self.register_local_members() => {}
        }

        let session = self.clone();
        let heartbeat_token = token.clone();
        spawn_task("heartbeat", &self.tracker, move || {
            session.run_heartbeats(id, heartbeat_token)
        });

        let known_versions = self.registry.known_versions();
        debug!(known = known_versions.len(), "opening update stream");
        let opened = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            opened = task_with_timeout(
                "subscribe",
                self.config.request_timeout(),
                self.transport.subscribe(known_versions),
            ) => opened,
        };
        let mut updates = match opened {
            Ok(updates) => updates,
            Err(e) => {
                warn!("failed to open update stream: {}", e);
                self.report_broken(id);
                return Ok(());
            }
        };

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                next = updates.next() => next,
            };

            match next {
                Some(Ok(update)) => {
                    if let Err(e) = self.registry.apply_remote_update(update) {
                        warn!("dropping malformed update: {}", e);
                    }
                }
                Some(Err(Error::Protocol(e))) => {
                    warn!("dropping malformed update: {}", e);
                }
                Some(Err(e)) => {
                    warn!("update stream failed: {}", e);
                    self.report_broken(id);
                    return Ok(());
                }
                None => {
                    info!("update stream closed");
                    self.report_broken(id);
                    return Ok(());
                }
            }
        }
    }

    /// Registers every local member again so the registry view is restored
    /// after it expired the previous session.
    async fn register_local_members(&self) {
        let members = self.registry.local_members();
        if members.is_empty() {
            return;
        }
        debug!(count = members.len(), "re-registering local members");

        let registrations = members.into_iter().map(|member| async move {
            let id = member.id.clone();
            let _timer = ScopedTimer::new("re-register", &id);
            if let Err(e) = self.transport.register(member).await {
                warn!(member = %id, "failed to re-register local member: {}", e);
            }
        });
        join_all(registrations).await;
    }

    async fn run_heartbeats(
        self: Arc<Self>,
        id: u64,
        token: CancellationToken,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let sent = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                sent = task_with_timeout(
                    "heartbeat",
                    self.config.heartbeat_timeout(),
                    self.transport.heartbeat(),
                ) => sent,
            };

            if let Err(e) = sent {
                warn!("heartbeat failed, aborting session: {}", e);
                self.report_broken(id);
                return Ok(());
            }
        }
    }

    /// Stops the background tasks without waiting for them
    pub(crate) fn abort(&self) {
        self.cancel.cancel();
    }

    fn report_broken(
        &self,
        id: u64,
    ) {
        let _ = self.broken_tx.send(id);
    }

    /// Stops every background task, unregisters the remaining local members
    /// within the close grace period and releases the transport.
    ///
    /// No subscriber or state callback fires once this returns.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let locals = self.registry.local_members();
        if !locals.is_empty() {
            info!(count = locals.len(), "unregistering local members");
            let grace = self.config.close_timeout();
            let unregistrations = locals.iter().map(|m| self.transport.unregister(m.id.clone()));
            match tokio::time::timeout(grace, join_all(unregistrations)).await {
                Ok(results) => {
                    for (member, result) in locals.iter().zip(results) {
                        if let Err(e) = result {
                            warn!(member = %member.id, "failed to unregister on close: {}", e);
                        }
                    }
                }
                Err(_) => warn!(
                    grace_ms = grace.as_millis() as u64,
                    "close grace period expired before all local members were unregistered"
                ),
            }
        }

        self.transport.close().await;
        self.registry.close();
        self.set_state(ConnectionState::Closed);
    }
}

