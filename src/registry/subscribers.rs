use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use tracing::trace;

use super::Registry;
use super::RegistryInner;
use crate::Filter;
use crate::Member;

/// Callback fired with the members matching the subscriber's filter.
pub type MembersCallback = Arc<dyn Fn(Vec<Member>) + Send + Sync + 'static>;

pub(crate) struct Subscriber {
    id: u64,
    callback: MembersCallback,
    filter: Option<Filter>,
    active: AtomicBool,
}

impl Subscriber {
    pub(crate) fn new(
        id: u64,
        callback: MembersCallback,
        filter: Option<Filter>,
    ) -> Self {
        Self {
            id,
            callback,
            filter,
            active: AtomicBool::new(true),
        }
    }

    /// Invokes the callback with the current matching members.
    ///
    /// Must be called with the registry notify gate held and without the
    /// state lock.
    pub(crate) fn notify(
        &self,
        registry: &Registry,
    ) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let members = registry.members(self.filter.as_ref());
        trace!(subscriber = self.id, members = members.len(), "notify subscriber");
        (self.callback)(members);
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Subscribers of a registry. Guarded by the registry state lock.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    next_id: u64,
    subscribers: HashMap<u64, Arc<Subscriber>>,
}

impl SubscriberSet {
    pub(crate) fn add(
        &mut self,
        callback: MembersCallback,
        filter: Option<Filter>,
    ) -> Arc<Subscriber> {
        self.next_id += 1;
        let subscriber = Arc::new(Subscriber::new(self.next_id, callback, filter));
        self.subscribers.insert(self.next_id, subscriber.clone());
        subscriber
    }

    pub(crate) fn remove(
        &mut self,
        id: u64,
    ) -> Option<Arc<Subscriber>> {
        self.subscribers.remove(&id)
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.values().cloned().collect()
    }

    /// Deactivates and removes every subscriber
    pub(crate) fn drain(&mut self) {
        for (_, s) in self.subscribers.drain() {
            s.deactivate();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle leaves the subscriber registered. Call
/// [`Subscription::unsubscribe`] to stop receiving updates.
#[must_use = "the subscription stays registered until `unsubscribe` is called"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    subscriber: Option<Arc<Subscriber>>,
}

impl Subscription {
    pub(crate) fn new(
        registry: Weak<RegistryInner>,
        subscriber: Option<Arc<Subscriber>>,
    ) -> Self {
        Self { registry, subscriber }
    }

    /// Removes the subscriber.
    ///
    /// Once this returns the callback will not be invoked again. An invocation
    /// already running on another thread completes before this returns.
    pub fn unsubscribe(mut self) {
        let Some(subscriber) = self.subscriber.take() else {
            return;
        };
        subscriber.deactivate();
        if let Some(inner) = self.registry.upgrade() {
            inner.state.lock().subscribers.remove(subscriber.id);
            inner.wait_idle();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.subscriber.as_ref().map(|s| s.id))
            .finish()
    }
}
