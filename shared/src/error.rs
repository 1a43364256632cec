use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EntityId, PeerId, RequestId, RequestOrigin, Version};

/// Reasons an owner refuses to apply a mutation to its payload
///
/// These travel back to the requesting peer inside a `MutationRejected`
/// message, so they carry owned data only.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MutationError {
    /// The mutation targets a different kind of payload
    #[error("Mutation {mutation} cannot be applied to a {payload} payload")]
    KindMismatch { mutation: String, payload: String },

    /// The pickup was already taken by someone who reached the owner first
    #[error("Pickup was already consumed by {by}")]
    AlreadyConsumed { by: PeerId },

    /// Every wave has already been cleared
    #[error("All waves are already completed")]
    AllWavesCompleted,

    /// The defeated enemy is not part of the wave currently in progress
    #[error("{enemy} is not a remaining enemy of wave {wave}")]
    EnemyNotInWave { enemy: EntityId, wave: u32 },

    /// A weapon action was requested while nothing is equipped
    #[error("No weapon is equipped")]
    NoWeaponEquipped,
}

/// Errors raised while replicating entity state between peers
///
/// Each one is isolated to the operation or request that produced it; none of
/// them stop the peer from processing further messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicationError {
    /// The entity is not registered on this peer
    #[error("{entity} is not registered - operation '{operation}' requires a live entity")]
    UnknownEntity {
        entity: EntityId,
        operation: &'static str,
    },

    /// A broadcast skipped one or more versions; a resync is needed
    #[error("{entity} is out of sync: expected {expected}, received {actual}")]
    OutOfSync {
        entity: EntityId,
        expected: Version,
        actual: Version,
    },

    /// The owner never confirmed a forwarded request, even after resubmission
    #[error("Owner {owner} of {entity} did not confirm request {request_id:?}")]
    AuthorityUnreachable {
        entity: EntityId,
        owner: PeerId,
        request_id: RequestId,
    },

    /// A pending request was invalidated by despawn or ownership change
    #[error("Request {request_id:?} on {entity} was cancelled")]
    Cancelled {
        entity: EntityId,
        request_id: RequestId,
    },

    /// The operation is reserved to the entity's owner
    #[error("{operation} on {entity} requires ownership, but it is owned by {owner}")]
    NotOwner {
        entity: EntityId,
        owner: PeerId,
        operation: &'static str,
    },

    /// The operation is reserved to the owner or the master
    #[error("{peer} is not permitted to {operation} {entity}")]
    NotAuthorized {
        entity: EntityId,
        peer: PeerId,
        operation: &'static str,
    },

    /// Only the master may spawn an entity for another peer
    #[error("{peer} is not permitted to spawn an entity owned by {owner}")]
    NotAuthorizedToSpawn { peer: PeerId, owner: PeerId },

    /// The request was already applied once
    #[error("Request {:?} from {} was already applied to {entity}", origin.request_id, origin.peer)]
    Duplicate {
        entity: EntityId,
        origin: RequestOrigin,
    },

    /// The entity id is already registered
    #[error("{entity} already exists")]
    EntityAlreadyExists { entity: EntityId },

    /// The peer is not part of the session
    #[error("{peer} is not a member of the session")]
    UnknownPeer { peer: PeerId },

    /// The owner refused the mutation
    #[error("Mutation on {entity} rejected: {reason}")]
    Rejected {
        entity: EntityId,
        reason: MutationError,
    },
}

/// Errors that can occur while encoding or decoding wire packets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The packet could not be serialized
    #[error("Failed to encode packet: {reason}")]
    Encode { reason: String },

    /// The bytes are not a valid packet. Data may be corrupted or malicious
    #[error("Failed to decode packet: {reason}")]
    Decode { reason: String },

    /// The packet exceeds the configured maximum size
    #[error("Packet of {length} bytes exceeds the maximum of {max} bytes")]
    TooLarge { length: usize, max: usize },
}
