use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::async_trait;
use tonic::Code;

use crate::network::ConnectionState;
use crate::network::Connector;
use crate::network::Transport;
use crate::network::UpdateStream;
use crate::Error;
use crate::Member;
use crate::MemberUpdate;
use crate::NetworkError;
use crate::Result;
use crate::Version;

/// Write calls recorded by [`FakeTransport`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Register(Member),
    Unregister(String),
    UpdateMetadata(String, HashMap<String, String>),
}

/// In-memory registry connection driven by the test.
///
/// Connectivity is set with [`set_state`](FakeTransport::set_state) and
/// updates are pushed into the most recently opened stream.
pub(crate) struct FakeTransport {
    state: watch::Sender<ConnectionState>,
    calls: Mutex<Vec<Call>>,
    subscribes: Mutex<Vec<HashMap<String, Version>>>,
    stream: Mutex<Option<mpsc::UnboundedSender<Result<MemberUpdate>>>>,
    reject_with: Mutex<Option<Code>>,
    unavailable: AtomicBool,
    register_delay: Mutex<Option<Duration>>,
    unregister_delay: Mutex<Option<Duration>>,
    heartbeats: AtomicUsize,
    closed: AtomicBool,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Ready);
        Arc::new(Self {
            state,
            calls: Mutex::new(Vec::new()),
            subscribes: Mutex::new(Vec::new()),
            stream: Mutex::new(None),
            reject_with: Mutex::new(None),
            unavailable: AtomicBool::new(false),
            register_delay: Mutex::new(None),
            unregister_delay: Mutex::new(None),
            heartbeats: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn set_state(
        &self,
        state: ConnectionState,
    ) {
        self.state.send_replace(state);
    }

    /// Drops the open update stream and reports the connection lost
    pub(crate) fn disconnect(&self) {
        self.stream.lock().take();
        self.unavailable.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
    }

    pub(crate) fn reconnect(&self) {
        self.unavailable.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Ready);
    }

    /// Every write fails with the given code until cleared
    pub(crate) fn reject_writes(
        &self,
        code: Option<Code>,
    ) {
        *self.reject_with.lock() = code;
    }

    /// Writes fail as if the server were unreachable, without touching the
    /// connectivity state
    pub(crate) fn set_unavailable(
        &self,
        unavailable: bool,
    ) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Register calls stall for `delay` before answering
    pub(crate) fn delay_register(
        &self,
        delay: Duration,
    ) {
        *self.register_delay.lock() = Some(delay);
    }

    /// Unregister calls stall for `delay` before answering
    pub(crate) fn delay_unregister(
        &self,
        delay: Duration,
    ) {
        *self.unregister_delay.lock() = Some(delay);
    }

    /// Sends an update on the open stream. Returns false if no stream is open.
    pub(crate) fn push(
        &self,
        update: Result<MemberUpdate>,
    ) -> bool {
        match self.stream.lock().as_ref() {
            Some(tx) => tx.send(update).is_ok(),
            None => false,
        }
    }

    pub(crate) fn has_stream(&self) -> bool {
        self.stream.lock().as_ref().map(|tx| !tx.is_closed()).unwrap_or(false)
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn registered(&self) -> Vec<Member> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Register(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn unregistered(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Unregister(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn subscribes(&self) -> Vec<HashMap<String, Version>> {
        self.subscribes.lock().clone()
    }

    pub(crate) fn heartbeat_count(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NetworkError::ServiceUnavailable("fake transport is down".to_string()).into());
        }
        if let Some(code) = *self.reject_with.lock() {
            return Err(Error::Rejected {
                code,
                message: "rejected by fake registry".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn register(
        &self,
        member: Member,
    ) -> Result<()> {
        let delay = *self.register_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_write()?;
        self.calls.lock().push(Call::Register(member));
        Ok(())
    }

    async fn unregister(
        &self,
        id: String,
    ) -> Result<()> {
        let delay = *self.unregister_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_write()?;
        self.calls.lock().push(Call::Unregister(id));
        Ok(())
    }

    async fn update_metadata(
        &self,
        id: String,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        self.check_write()?;
        self.calls.lock().push(Call::UpdateMetadata(id, metadata));
        Ok(())
    }

    async fn subscribe(
        &self,
        known_versions: HashMap<String, Version>,
    ) -> Result<UpdateStream> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NetworkError::ServiceUnavailable("fake transport is down".to_string()).into());
        }
        self.subscribes.lock().push(known_versions);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.stream.lock() = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn heartbeat(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NetworkError::ServiceUnavailable("fake transport is down".to_string()).into());
        }
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn connectivity(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stream.lock().take();
        self.set_state(ConnectionState::Closed);
    }
}

/// Connector serving [`FakeTransport`]s by address. Unknown addresses fail
/// as unreachable.
#[derive(Default)]
pub(crate) struct FakeConnector {
    transports: HashMap<String, Arc<FakeTransport>>,
    attempts: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_transport(
        mut self,
        addr: &str,
        transport: Arc<FakeTransport>,
    ) -> Self {
        self.transports.insert(addr.to_string(), transport);
        self
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        addr: String,
    ) -> Result<Arc<dyn Transport>> {
        self.attempts.lock().push(addr.clone());
        match self.transports.get(&addr) {
            Some(transport) => Ok(transport.clone() as Arc<dyn Transport>),
            None => Err(NetworkError::ServiceUnavailable(format!("{addr} unreachable")).into()),
        }
    }
}
