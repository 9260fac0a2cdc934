//! Local replica of the cluster registry.
//!
//! The [`Registry`] holds every known member, marks the members registered by
//! this client as local, and notifies subscribers whenever the visible state
//! changes.
//!
//! Remote updates never touch a local member: only this client's own
//! register, metadata update and unregister calls may change it.

mod member;
mod subscribers;

pub use member::*;
pub use subscribers::MembersCallback;
pub use subscribers::Subscription;


use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::ReentrantMutex;
use tracing::debug;
use tracing::warn;

use crate::Filter;
use crate::ProtocolError;
use subscribers::SubscriberSet;

struct Entry {
    member: Member,
    // Only set for remote members.
    version: Option<Version>,
}

#[derive(Default)]
pub(crate) struct State {
    members: HashMap<String, Entry>,
    // Always a subset of the keys of `members`.
    local_ids: HashSet<String>,
    subscribers: SubscriberSet,
    closed: bool,
}

pub(crate) struct RegistryInner {
    pub(crate) state: Mutex<State>,
    // Held across a whole notification fan-out. Every callback runs under it,
    // so callbacks never overlap. Reentrant so a callback may write to the
    // registry or unsubscribe from its own thread. Always taken before
    // `state`, never while holding it.
    notify_gate: ReentrantMutex<()>,
}

impl RegistryInner {
    /// Blocks until a fan-out running on another thread returns.
    pub(crate) fn wait_idle(&self) {
        drop(self.notify_gate.lock());
    }
}

/// Eventually consistent view of the cluster members.
///
/// Cloning is cheap and every clone refers to the same store.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(State::default()),
                notify_gate: ReentrantMutex::new(()),
            }),
        }
    }

    /// Adds or overwrites a member owned by this client.
    pub fn register_local(
        &self,
        member: Member,
    ) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            debug!(member.id = %member.id, member.service = %member.service, "register local member");
            state.local_ids.insert(member.id.clone());
            state.members.insert(member.id.clone(), Entry { member, version: None });
        }
        self.notify();
    }

    /// Removes a member owned by this client. Returns false if the member is
    /// not local.
    pub fn unregister_local(
        &self,
        id: &str,
    ) -> bool {
        {
            let mut state = self.inner.state.lock();
            if !state.local_ids.remove(id) {
                return false;
            }
            state.members.remove(id);
            debug!(member.id = %id, "unregister local member");
        }
        self.notify();
        true
    }

    /// Merges `delta` into the metadata of a member owned by this client.
    /// Returns false if the member is not local.
    pub fn update_metadata_local(
        &self,
        id: &str,
        delta: &HashMap<String, String>,
    ) -> bool {
        {
            let mut state = self.inner.state.lock();
            if !state.local_ids.contains(id) {
                return false;
            }
            match state.members.get_mut(id) {
                Some(entry) => entry.member.merge_metadata(delta),
                None => return false,
            }
            debug!(member.id = %id, keys = delta.len(), "update local member metadata");
        }
        self.notify();
        true
    }

    /// Applies an update streamed from the registry.
    ///
    /// Updates addressed to a local member are ignored. A malformed update is
    /// rejected without changing the store.
    pub fn apply_remote_update(
        &self,
        update: MemberUpdate,
    ) -> Result<(), ProtocolError> {
        if update.id.is_empty() {
            return Err(ProtocolError::MissingId);
        }

        let MemberUpdate {
            id,
            kind,
            member,
            version,
        } = update;

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Ok(());
            }
            if state.local_ids.contains(&id) {
                debug!(member.id = %id, kind = %kind, "ignoring remote update for local member");
                return Ok(());
            }

            match kind {
                UpdateKind::Register | UpdateKind::Metadata => {
                    let Some(mut member) = member else {
                        return Err(ProtocolError::MissingMember {
                            id,
                            kind: kind.as_str(),
                        });
                    };
                    if member.id != id {
                        warn!(update.id = %id, member.id = %member.id, "update id does not match member id");
                        member.id = id.clone();
                    }
                    debug!(
                        member.id = %id,
                        member.service = %member.service,
                        member.locality = %member.locality,
                        member.revision = %member.revision,
                        version.owner = version.as_ref().map(|v| v.owner_id.as_str()).unwrap_or(""),
                        version.timestamp = version.as_ref().map(|v| v.timestamp).unwrap_or(0),
                        kind = %kind,
                        "apply remote update"
                    );
                    state.members.insert(id, Entry { member, version });
                }
                UpdateKind::Unregister => {
                    if state.members.remove(&id).is_none() {
                        return Ok(());
                    }
                    debug!(member.id = %id, "apply remote unregister");
                }
            }
        }
        self.notify();
        Ok(())
    }

    /// Returns a copy of the members, optionally filtered. Order is
    /// unspecified.
    pub fn members(
        &self,
        filter: Option<&Filter>,
    ) -> Vec<Member> {
        let state = self.inner.state.lock();
        state
            .members
            .values()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.member)))
            .map(|e| e.member.clone())
            .collect()
    }

    /// Returns a copy of the member with the given id.
    pub fn member(
        &self,
        id: &str,
    ) -> Option<Member> {
        self.inner.state.lock().members.get(id).map(|e| e.member.clone())
    }

    /// Returns the members owned by this client.
    pub fn local_members(&self) -> Vec<Member> {
        let state = self.inner.state.lock();
        state
            .local_ids
            .iter()
            .filter_map(|id| state.members.get(id))
            .map(|e| e.member.clone())
            .collect()
    }

    pub fn is_local(
        &self,
        id: &str,
    ) -> bool {
        self.inner.state.lock().local_ids.contains(id)
    }

    /// Versions of the remote members. Sent to the registry on subscribe so
    /// it only streams what changed. Local members are excluded as the
    /// registry never echoes them back.
    pub fn known_versions(&self) -> HashMap<String, Version> {
        let state = self.inner.state.lock();
        state
            .members
            .iter()
            .filter(|(id, _)| !state.local_ids.contains(*id))
            .filter_map(|(id, e)| e.version.clone().map(|v| (id.clone(), v)))
            .collect()
    }

    /// Registers `callback` to fire whenever the registry changes.
    ///
    /// The callback is invoked once with the current matching members before
    /// this returns, so there is no need to call [`Registry::members`] first.
    /// Callbacks run outside the registry lock, one at a time across all
    /// subscribers, and may read or write the registry or unsubscribe from
    /// their own thread. A callback must not block on another thread that is
    /// writing to the registry.
    pub fn subscribe<F>(
        &self,
        callback: F,
        filter: Option<Filter>,
    ) -> Subscription
    where
        F: Fn(Vec<Member>) + Send + Sync + 'static,
    {
        let subscriber = {
            let mut state = self.inner.state.lock();
            if state.closed {
                None
            } else {
                Some(state.subscribers.add(Arc::new(callback), filter))
            }
        };
        if let Some(s) = &subscriber {
            let _gate = self.inner.notify_gate.lock();
            s.notify(self);
        }
        Subscription::new(Arc::downgrade(&self.inner), subscriber)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Drops every member and subscriber. Later calls are no-ops.
    ///
    /// Waits for callbacks running on other threads, so no callback fires
    /// once this returns.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.members.clear();
            state.local_ids.clear();
            state.subscribers.drain();
        }
        self.inner.wait_idle();
    }

    fn notify(&self) {
        let _gate = self.inner.notify_gate.lock();
        let subscribers = self.inner.state.lock().subscribers.snapshot();
        for s in subscribers {
            s.notify(self);
        }
    }
}
