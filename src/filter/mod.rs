//! Member filters
//!
//! A [`Filter`] maps service name patterns to a [`ServiceFilter`]. Service
//! names, localities and metadata values may contain `*` wildcards; metadata
//! keys must match exactly.
//!
//! Lookup active order service members in `us-east-1` speaking protocol
//! version 2 or 3:
//!
//! ```rust
//! use fuddle::Filter;
//! use fuddle::ServiceFilter;
//!
//! let filter = Filter::new().with_service(
//!     "order",
//!     ServiceFilter::new()
//!         .with_locality(["aws.us-east-1-*"])
//!         .with_metadata("status", ["active"])
//!         .with_metadata("protocol.version", ["2", "3"]),
//! );
//! ```

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::utils::wildcard;
use crate::Member;


/// Maps a service name pattern to the filter applied to members of the
/// matching services.
///
/// A member matches if its service matches at least one pattern and it is
/// accepted by every service filter whose pattern matches. An empty filter
/// matches no members.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(HashMap<String, ServiceFilter>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(
        mut self,
        service: impl Into<String>,
        filter: ServiceFilter,
    ) -> Self {
        self.0.insert(service.into(), filter);
        self
    }

    pub fn insert(
        &mut self,
        service: impl Into<String>,
        filter: ServiceFilter,
    ) -> Option<ServiceFilter> {
        self.0.insert(service.into(), filter)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(
        &self,
        member: &Member,
    ) -> bool {
        let mut matched = false;
        for (service, filter) in &self.0 {
            if wildcard::matches(service, &member.service) {
                matched = true;
                if !filter.matches(member) {
                    return false;
                }
            }
        }
        matched
    }
}

impl From<HashMap<String, ServiceFilter>> for Filter {
    fn from(m: HashMap<String, ServiceFilter>) -> Self {
        Self(m)
    }
}

impl<S: Into<String>> FromIterator<(S, ServiceFilter)> for Filter {
    fn from_iter<I: IntoIterator<Item = (S, ServiceFilter)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(s, f)| (s.into(), f)).collect())
    }
}

/// Filter applied to every member of a service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceFilter {
    /// Locality patterns. The member locality must match at least one of
    /// them. `None` or an empty list accepts any locality.
    ///
    /// An empty list is not "match nothing": `Some(vec![])` behaves exactly
    /// like `None`. To exclude every member of a service, leave the service
    /// out of the [`Filter`] instead.
    #[serde(default)]
    pub locality: Option<Vec<String>>,

    #[serde(default)]
    pub metadata: MetadataFilter,
}

impl ServiceFilter {
    /// Accepts every member of the service.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locality<I, S>(
        mut self,
        patterns: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locality
            .get_or_insert_with(Vec::new)
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn with_metadata<I, S>(
        mut self,
        key: impl Into<String>,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.insert(key, values);
        self
    }

    pub fn matches(
        &self,
        member: &Member,
    ) -> bool {
        if let Some(localities) = &self.locality {
            if !localities.is_empty()
                && !localities.iter().any(|l| wildcard::matches(l, &member.locality))
            {
                return false;
            }
        }

        self.metadata.matches(member)
    }
}

/// Maps a metadata key to the accepted value patterns.
///
/// For every key the member must have that exact key, and its value must
/// match at least one of the patterns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(HashMap<String, Vec<String>>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(
        &mut self,
        key: impl Into<String>,
        values: I,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(
        &self,
        member: &Member,
    ) -> bool {
        self.0.iter().all(|(key, patterns)| match member.metadata.get(key) {
            Some(value) => patterns.iter().any(|p| wildcard::matches(p, value)),
            None => false,
        })
    }
}

impl From<HashMap<String, Vec<String>>> for MetadataFilter {
    fn from(m: HashMap<String, Vec<String>>) -> Self {
        Self(m)
    }
}
