use serde::{Deserialize, Serialize};

use crate::{
    error::MutationError,
    ledger::RequestLedger,
    payload::{Mutation, Payload},
    types::{EntityId, MessageIndex, PeerId, RequestId, RequestOrigin, Version},
};

/// Full authoritative state of one entity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: EntityId,
    pub owner: PeerId,
    pub version: Version,
    pub payload: Payload,
    pub ledger: RequestLedger,
}

/// Commands exchanged between peers over the command channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetMessage {
    /// A non-owner asks the owner to apply a mutation
    MutationRequest {
        entity: EntityId,
        requested_by: PeerId,
        request_id: RequestId,
        mutation: Mutation,
    },
    /// The owner publishes the result of an accepted mutation
    MutationBroadcast {
        entity: EntityId,
        new_version: Version,
        payload: Payload,
        cause: Option<RequestOrigin>,
    },
    /// The owner refused a request
    MutationRejected {
        entity: EntityId,
        request_id: RequestId,
        reason: MutationError,
    },
    /// Write authority over an entity moves to another peer
    OwnershipTransfer {
        entity: EntityId,
        old_owner: PeerId,
        new_owner: PeerId,
        at_version: Version,
    },
    /// The master asks the current owner to hand an entity over
    TransferRequest { entity: EntityId, new_owner: PeerId },
    /// A new master announces itself and the entities it inherited
    MasterReassigned {
        new_master: PeerId,
        departed: PeerId,
        reassigned: Vec<EntitySnapshot>,
    },
    SpawnEntity(EntitySnapshot),
    DespawnEntity { entity: EntityId },
    /// A peer detected a version gap and needs the owner's full state
    ResyncRequest { entity: EntityId },
    EntitySnapshot(EntitySnapshot),
}

impl NetMessage {
    pub fn name(&self) -> &'static str {
        match self {
            NetMessage::MutationRequest { .. } => "MutationRequest",
            NetMessage::MutationBroadcast { .. } => "MutationBroadcast",
            NetMessage::MutationRejected { .. } => "MutationRejected",
            NetMessage::OwnershipTransfer { .. } => "OwnershipTransfer",
            NetMessage::TransferRequest { .. } => "TransferRequest",
            NetMessage::MasterReassigned { .. } => "MasterReassigned",
            NetMessage::SpawnEntity(_) => "SpawnEntity",
            NetMessage::DespawnEntity { .. } => "DespawnEntity",
            NetMessage::ResyncRequest { .. } => "ResyncRequest",
            NetMessage::EntitySnapshot(_) => "EntitySnapshot",
        }
    }

    /// The single entity this message is about, if any.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            NetMessage::MutationRequest { entity, .. }
            | NetMessage::MutationBroadcast { entity, .. }
            | NetMessage::MutationRejected { entity, .. }
            | NetMessage::OwnershipTransfer { entity, .. }
            | NetMessage::TransferRequest { entity, .. }
            | NetMessage::DespawnEntity { entity }
            | NetMessage::ResyncRequest { entity } => Some(*entity),
            NetMessage::SpawnEntity(snapshot) | NetMessage::EntitySnapshot(snapshot) => {
                Some(snapshot.entity)
            }
            NetMessage::MasterReassigned { .. } => None,
        }
    }
}

/// Unit of the reliable channel, as it goes over the transport
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Data {
        index: MessageIndex,
        message: NetMessage,
    },
    /// Cumulative acknowledgement of every index up to and including `through`
    Ack { through: MessageIndex },
}
