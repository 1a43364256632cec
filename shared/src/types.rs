use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a session participant. Peers are totally ordered; the lowest
/// present id acts as master.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u16);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Globally unique identity of a replicated entity.
///
/// Uniqueness comes from pairing the creating peer with a serial that the
/// creator never rewinds, so no coordination round trip is needed to spawn.
/// A peer that leaves and rejoins under the same `PeerId` starts counting
/// serials again, so each run of a peer also stamps its ids with a random
/// `incarnation`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    pub creator: PeerId,
    pub incarnation: u64,
    pub serial: u32,
}

impl EntityId {
    pub fn new(creator: PeerId, serial: u32) -> Self {
        Self::with_incarnation(creator, 0, serial)
    }

    pub fn with_incarnation(creator: PeerId, incarnation: u64, serial: u32) -> Self {
        Self {
            creator,
            incarnation,
            serial,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.incarnation == 0 {
            write!(f, "entity#{}.{}", self.creator.0, self.serial)
        } else {
            write!(
                f,
                "entity#{}.{}@{:x}",
                self.creator.0, self.serial, self.incarnation
            )
        }
    }
}

/// Per-origin monotonically increasing mutation request number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u32);

impl RequestId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Per-entity state version, bumped on every accepted mutation.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(pub u32);

impl Version {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Sequence number of a packet on one (sender, receiver) command channel.
pub type MessageIndex = u64;

/// The peer and request number that caused an authoritative mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestOrigin {
    pub peer: PeerId,
    pub request_id: RequestId,
}

impl RequestOrigin {
    pub fn new(peer: PeerId, request_id: RequestId) -> Self {
        Self { peer, request_id }
    }
}
