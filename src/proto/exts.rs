use std::collections::HashMap;

use super::MemberUpdateType;
use crate::proto;
use crate::Member;
use crate::MemberUpdate;
use crate::ProtocolError;
use crate::UpdateKind;
use crate::Version;

impl proto::Member {
    /// Builds the wire member for a registration owned by `client_id`
    pub fn from_local(
        member: Member,
        client_id: &str,
    ) -> Self {
        Self {
            id: member.id,
            client_id: client_id.to_string(),
            service: member.service,
            locality: member.locality,
            started: member.started,
            revision: member.revision,
            metadata: member.metadata,
        }
    }
}

impl From<proto::Member> for Member {
    fn from(m: proto::Member) -> Self {
        Member {
            id: m.id,
            service: m.service,
            locality: m.locality,
            started: m.started,
            revision: m.revision,
            metadata: m.metadata,
        }
    }
}

impl From<Version> for proto::Version {
    fn from(v: Version) -> Self {
        Self {
            owner_id: v.owner_id,
            timestamp: v.timestamp,
        }
    }
}

impl From<proto::Version> for Version {
    fn from(v: proto::Version) -> Self {
        Version {
            owner_id: v.owner_id,
            timestamp: v.timestamp,
        }
    }
}

impl proto::SubscribeRequest {
    pub fn new(
        client_id: &str,
        known_versions: HashMap<String, Version>,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            known_versions: known_versions
                .into_iter()
                .map(|(id, v)| (id, v.into()))
                .collect(),
        }
    }
}

impl TryFrom<proto::MemberUpdate> for MemberUpdate {
    type Error = ProtocolError;

    /// Only the id and kind are checked here. Whether a register or metadata
    /// update carries its member is left to the registry.
    fn try_from(update: proto::MemberUpdate) -> Result<Self, Self::Error> {
        if update.id.is_empty() {
            return Err(ProtocolError::MissingId);
        }

        let kind = match MemberUpdateType::try_from(update.update_type) {
            Ok(MemberUpdateType::Register) => UpdateKind::Register,
            Ok(MemberUpdateType::Unregister) => UpdateKind::Unregister,
            Ok(MemberUpdateType::Metadata) => UpdateKind::Metadata,
            Ok(MemberUpdateType::Unspecified) | Err(_) => {
                return Err(ProtocolError::UnknownUpdateKind {
                    id: update.id,
                    kind: update.update_type,
                });
            }
        };

        Ok(MemberUpdate {
            id: update.id,
            kind,
            member: update.member.map(Member::from),
            version: update.version.map(Version::from),
        })
    }
}
