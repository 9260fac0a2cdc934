use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::utils::time::now_millis;

/// A participant in the cluster.
///
/// `id`, `service`, `locality`, `started` and `revision` are fixed when the
/// member registers. Only `metadata` changes over the member's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Member {
    /// Unique identifier for the member in the cluster, chosen by the
    /// registrant.
    pub id: String,

    /// Name of the service the member runs. Used for discovery grouping.
    pub service: String,

    /// Location of the member, such as `aws.us-east-1-b`. Structure it with a
    /// delimiter so it can be filtered with wildcards.
    pub locality: String,

    /// Time the member started in UNIX milliseconds.
    pub started: i64,

    /// Version or build of the service running on the member.
    pub revision: String,

    /// Application defined key-value pairs shared with the cluster.
    pub metadata: HashMap<String, String>,
}

impl Member {
    /// Creates a member started now with no locality, revision or metadata.
    pub fn new(
        id: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            locality: String::new(),
            started: now_millis(),
            revision: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_locality(
        mut self,
        locality: impl Into<String>,
    ) -> Self {
        self.locality = locality.into();
        self
    }

    pub fn with_started(
        mut self,
        started: i64,
    ) -> Self {
        self.started = started;
        self
    }

    pub fn with_revision(
        mut self,
        revision: impl Into<String>,
    ) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_metadata<K, V>(
        mut self,
        metadata: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata
            .extend(metadata.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Merges `delta` into the metadata by key.
    pub(crate) fn merge_metadata(
        &mut self,
        delta: &HashMap<String, String>,
    ) {
        for (k, v) in delta {
            self.metadata.insert(k.clone(), v.clone());
        }
    }
}

/// Version attached to every member received from the registry.
///
/// The client never compares versions. The last update received for a member
/// replaces the previous one, and versions are only reported back to the
/// registry so it can send the delta on resubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Version {
    /// Registry node that owns the member.
    pub owner_id: String,

    /// Monotonic timestamp assigned by the owner.
    pub timestamp: u64,
}

impl Version {
    pub fn new(
        owner_id: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Register,
    Unregister,
    Metadata,
}

impl UpdateKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Register => "register",
            UpdateKind::Unregister => "unregister",
            UpdateKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change to a remote member streamed from the registry.
///
/// Register and metadata updates carry a full snapshot of the member.
/// Unregister updates only carry the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberUpdate {
    pub id: String,
    pub kind: UpdateKind,
    pub member: Option<Member>,
    pub version: Option<Version>,
}

impl MemberUpdate {
    pub fn register(
        member: Member,
        version: Version,
    ) -> Self {
        Self {
            id: member.id.clone(),
            kind: UpdateKind::Register,
            member: Some(member),
            version: Some(version),
        }
    }

    pub fn metadata(
        member: Member,
        version: Version,
    ) -> Self {
        Self {
            id: member.id.clone(),
            kind: UpdateKind::Metadata,
            member: Some(member),
            version: Some(version),
        }
    }

    pub fn unregister(
        id: impl Into<String>,
        version: Option<Version>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: UpdateKind::Unregister,
            member: None,
            version,
        }
    }
}
