//! End to end tests of several clients sharing an in-process registry
//! through the public [`Connector`] and [`Transport`] seams.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use fuddle::ConnectionState;
use fuddle::Connector;
use fuddle::Filter;
use fuddle::Fuddle;
use fuddle::Member;
use fuddle::MemberUpdate;
use fuddle::Registry;
use fuddle::Result;
use fuddle::ServiceFilter;
use fuddle::Transport;
use fuddle::UpdateStream;
use fuddle::Version;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::async_trait;

const SEED: &str = "127.0.0.1:8220";

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

fn enable_logger() {
    *LOGGER_INIT;
}

/// Registry shared by every transport opened through one [`HubConnector`]
#[derive(Default)]
struct Hub {
    members: Mutex<HashMap<String, (Member, Version)>>,
    streams: Mutex<Vec<(String, mpsc::UnboundedSender<Result<MemberUpdate>>)>>,
    clock: AtomicU64,
}

impl Hub {
    fn next_version(
        &self,
        owner: &str,
    ) -> Version {
        Version::new(owner, self.clock.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn broadcast(
        &self,
        from: &str,
        update: MemberUpdate,
    ) {
        self.streams
            .lock()
            .retain(|(owner, tx)| owner == from || tx.send(Ok(update.clone())).is_ok());
    }
}

struct HubTransport {
    owner: String,
    hub: Arc<Hub>,
    state: watch::Sender<ConnectionState>,
}

#[async_trait]
impl Transport for HubTransport {
    async fn register(
        &self,
        member: Member,
    ) -> Result<()> {
        let version = self.hub.next_version(&self.owner);
        self.hub
            .members
            .lock()
            .insert(member.id.clone(), (member.clone(), version.clone()));
        self.hub.broadcast(&self.owner, MemberUpdate::register(member, version));
        Ok(())
    }

    async fn unregister(
        &self,
        id: String,
    ) -> Result<()> {
        if self.hub.members.lock().remove(&id).is_some() {
            let version = self.hub.next_version(&self.owner);
            self.hub
                .broadcast(&self.owner, MemberUpdate::unregister(id, Some(version)));
        }
        Ok(())
    }

    async fn update_metadata(
        &self,
        id: String,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let updated = {
            let mut members = self.hub.members.lock();
            members.get_mut(&id).map(|(member, version)| {
                member.metadata.extend(metadata);
                *version = self.hub.next_version(&self.owner);
                (member.clone(), version.clone())
            })
        };
        if let Some((member, version)) = updated {
            self.hub.broadcast(&self.owner, MemberUpdate::metadata(member, version));
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        known_versions: HashMap<String, Version>,
    ) -> Result<UpdateStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let members = self.hub.members.lock();
            for (id, (member, version)) in members.iter() {
                if known_versions.get(id) != Some(version) {
                    let _ = tx.send(Ok(MemberUpdate::register(member.clone(), version.clone())));
                }
            }
        }
        self.hub.streams.lock().push((self.owner.clone(), tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn heartbeat(&self) -> Result<()> {
        Ok(())
    }

    fn connectivity(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn close(&self) {
        self.hub.streams.lock().retain(|(owner, _)| owner != &self.owner);
        self.state.send_replace(ConnectionState::Closed);
    }
}

struct HubConnector {
    hub: Arc<Hub>,
    opened: AtomicU64,
}

impl HubConnector {
    fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            opened: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Connector for HubConnector {
    async fn connect(
        &self,
        addr: String,
    ) -> Result<Arc<dyn Transport>> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        let (state, _) = watch::channel(ConnectionState::Ready);
        Ok(Arc::new(HubTransport {
            owner: format!("{addr}/{n}"),
            hub: self.hub.clone(),
            state,
        }))
    }
}

async fn connect(connector: &Arc<HubConnector>) -> Fuddle {
    enable_logger();
    Fuddle::builder(vec![SEED.to_string()])
        .heartbeat_interval(Duration::from_millis(20))
        .connector(connector.clone())
        .connect()
        .await
        .expect("connect")
}

async fn eventually<F>(
    what: &str,
    condition: F,
) where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn random_member(service: &str) -> Member {
    Member::new(format!("{service}-{}", nanoid::nanoid!(8)), service)
        .with_locality("eu-west-2-c")
        .with_revision("v0.1.0")
        .with_metadata([("status", "booting")])
}

#[test]
fn test_filter_local_member_among_remote_members() {
    let registry = Registry::new();
    let local = random_member("orders");
    registry.register_local(local.clone());

    for _ in 0..5 {
        let remote = Member::new(nanoid::nanoid!(), nanoid::nanoid!())
            .with_locality(nanoid::nanoid!())
            .with_metadata([(nanoid::nanoid!(), nanoid::nanoid!())]);
        registry
            .apply_remote_update(MemberUpdate::register(remote, Version::new("node-1", 1)))
            .expect("well formed update");
    }

    let filter = Filter::new().with_service("orders", ServiceFilter::new());
    assert_eq!(registry.members(Some(&filter)), vec![local]);
    assert_eq!(registry.members(None).len(), 6);
}

#[tokio::test]
async fn test_clients_discover_each_other() {
    let connector = Arc::new(HubConnector::new(Arc::new(Hub::default())));
    let orders_client = connect(&connector).await;
    let payments_client = connect(&connector).await;

    let orders = random_member("orders");
    let payments = random_member("payments");
    orders_client.register(orders.clone()).await.expect("register orders");
    payments_client
        .register(payments.clone())
        .await
        .expect("register payments");

    eventually("orders client sees payments", || {
        orders_client.member(&payments.id) == Some(payments.clone())
    })
    .await;
    eventually("payments client sees orders", || {
        payments_client.member(&orders.id) == Some(orders.clone())
    })
    .await;

    let filter = Filter::new().with_service("pay*", ServiceFilter::new());
    assert_eq!(orders_client.members(Some(&filter)), vec![payments]);
    assert_eq!(orders_client.local_members(), vec![orders]);

    orders_client.close().await;
    payments_client.close().await;
}

#[tokio::test]
async fn test_late_client_receives_existing_members() {
    let connector = Arc::new(HubConnector::new(Arc::new(Hub::default())));
    let first = connect(&connector).await;
    let members: Vec<Member> = (0..3).map(|_| random_member("search")).collect();
    for m in &members {
        first.register(m.clone()).await.expect("register");
    }

    let late = connect(&connector).await;
    eventually("late client catches up", || late.members(None).len() == 3).await;

    let mut seen = late.members(None);
    seen.sort_by(|a, b| a.id.cmp(&b.id));
    let mut expected = members;
    expected.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(seen, expected);

    first.close().await;
    late.close().await;
}

#[tokio::test]
async fn test_metadata_update_reaches_filtered_subscriber() {
    let connector = Arc::new(HubConnector::new(Arc::new(Hub::default())));
    let producer = connect(&connector).await;
    let watcher = connect(&connector).await;

    let active = Arc::new(Mutex::new(Vec::new()));
    let recorded = active.clone();
    let _subscription = watcher.subscribe(
        move |members| *recorded.lock() = members,
        Some(Filter::new().with_service(
            "orders",
            ServiceFilter::new().with_metadata("status", ["active"]),
        )),
    );

    let member = random_member("orders");
    let local = producer.register(member.clone()).await.expect("register");
    eventually("booting member replicated", || watcher.member(&member.id).is_some()).await;
    assert!(active.lock().is_empty());

    local
        .update_metadata([("status", "active")])
        .await
        .expect("update metadata");
    eventually("subscriber sees active member", || active.lock().len() == 1).await;

    let seen = active.lock()[0].clone();
    assert_eq!(seen.id, member.id);
    assert_eq!(seen.metadata.get("status").map(String::as_str), Some("active"));

    producer.close().await;
    watcher.close().await;
}

#[tokio::test]
async fn test_close_unregisters_members_from_other_clients() {
    let connector = Arc::new(HubConnector::new(Arc::new(Hub::default())));
    let leaving = connect(&connector).await;
    let staying = connect(&connector).await;

    let member = random_member("orders");
    leaving.register(member.clone()).await.expect("register");
    eventually("member replicated", || staying.member(&member.id).is_some()).await;

    leaving.close().await;
    assert_eq!(leaving.connection_state(), ConnectionState::Closed);
    assert!(leaving.members(None).is_empty());

    eventually("member removed", || staying.member(&member.id).is_none()).await;
    staying.close().await;
}

#[tokio::test]
async fn test_unregister_removes_member_everywhere() {
    let connector = Arc::new(HubConnector::new(Arc::new(Hub::default())));
    let owner = connect(&connector).await;
    let observer = connect(&connector).await;

    let member = random_member("inventory");
    let local = owner.register(member.clone()).await.expect("register");
    eventually("member replicated", || observer.member(&member.id).is_some()).await;

    local.unregister().await.expect("unregister");
    assert!(owner.member(&member.id).is_none());
    eventually("member removed", || observer.member(&member.id).is_none()).await;

    owner.close().await;
    observer.close().await;
}
