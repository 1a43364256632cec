use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info};

use brawlsync_shared::{EntityId, NetMessage, PeerId, ReplicationError};

/// How a requested ownership transfer is carried out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferPlan {
    /// The requester owns the entity; ownership already moved locally and
    /// must now be announced
    Apply { old_owner: PeerId },
    /// The requester is the master; the owner has to be asked to transfer
    Delegate { owner: PeerId },
    /// The entity already belongs to the requested peer
    Unchanged,
}

/// Maps every known entity to the one peer allowed to mutate it
///
/// Messages that reach this peer before the ownership change they depend on
/// are held per entity, in arrival order, until that change is applied.
pub struct OwnershipRegistry {
    local: PeerId,
    owners: HashMap<EntityId, PeerId>,
    queued: HashMap<EntityId, VecDeque<(PeerId, NetMessage)>>,
    awaiting_handoff: HashSet<EntityId>,
    transfer_pending: HashMap<EntityId, PeerId>,
    relinquished: HashSet<EntityId>,
}

impl OwnershipRegistry {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            owners: HashMap::new(),
            queued: HashMap::new(),
            awaiting_handoff: HashSet::new(),
            transfer_pending: HashMap::new(),
            relinquished: HashSet::new(),
        }
    }

    pub fn register(&mut self, entity: EntityId, owner: PeerId) -> Result<(), ReplicationError> {
        if self.owners.contains_key(&entity) {
            return Err(ReplicationError::EntityAlreadyExists { entity });
        }
        self.owners.insert(entity, owner);
        Ok(())
    }

    /// Forgets the entity. Returns how many queued messages were discarded.
    pub fn deregister(&mut self, entity: &EntityId) -> usize {
        self.owners.remove(entity);
        self.awaiting_handoff.remove(entity);
        self.transfer_pending.remove(entity);
        self.relinquished.remove(entity);
        self.queued
            .remove(entity)
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    pub fn owner_of(&self, entity: &EntityId) -> Result<PeerId, ReplicationError> {
        self.owners
            .get(entity)
            .copied()
            .ok_or(ReplicationError::UnknownEntity {
                entity: *entity,
                operation: "owner_of",
            })
    }

    pub fn is_owned_locally(&self, entity: &EntityId) -> bool {
        self.owners.get(entity) == Some(&self.local)
    }

    /// Records a new owner and returns the previous one.
    pub fn set_owner(&mut self, entity: EntityId, owner: PeerId) -> Option<PeerId> {
        let previous = self.owners.insert(entity, owner);
        self.transfer_pending.remove(&entity);
        if owner == self.local {
            self.relinquished.remove(&entity);
        } else if previous == Some(self.local) {
            self.relinquished.insert(entity);
        }
        if previous != Some(owner) {
            info!("{} is now owned by {}", entity, owner);
        }
        previous
    }

    /// Validates a transfer requested by `requester` and decides how it is
    /// carried out. Only the owner and the master may move an entity.
    pub fn transfer(
        &mut self,
        entity: EntityId,
        requester: PeerId,
        master: PeerId,
        new_owner: PeerId,
    ) -> Result<TransferPlan, ReplicationError> {
        let owner = self.owner_of(&entity)?;
        if owner == new_owner {
            return Ok(TransferPlan::Unchanged);
        }
        if owner == requester {
            self.set_owner(entity, new_owner);
            return Ok(TransferPlan::Apply { old_owner: owner });
        }
        if requester == master {
            debug!("asking {} to hand {} over to {}", owner, entity, new_owner);
            self.transfer_pending.insert(entity, new_owner);
            return Ok(TransferPlan::Delegate { owner });
        }
        Err(ReplicationError::NotAuthorized {
            entity,
            peer: requester,
            operation: "transfer",
        })
    }

    /// The new owner the master asked for, if that transfer is still in
    /// flight.
    pub fn pending_transfer(&self, entity: &EntityId) -> Option<PeerId> {
        self.transfer_pending.get(entity).copied()
    }

    /// Whether the local peer handed this entity to someone else.
    pub fn was_relinquished(&self, entity: &EntityId) -> bool {
        self.relinquished.contains(entity)
    }

    pub fn queue(&mut self, entity: EntityId, from: PeerId, message: NetMessage) {
        debug!("queueing {} from {} for {}", message.name(), from, entity);
        self.queued.entry(entity).or_default().push_back((from, message));
    }

    pub fn take_queued(&mut self, entity: &EntityId) -> Vec<(PeerId, NetMessage)> {
        self.queued
            .remove(entity)
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub fn queued_len(&self, entity: &EntityId) -> usize {
        self.queued.get(entity).map(VecDeque::len).unwrap_or(0)
    }

    /// Moves everything `from` owns to `to`, returning the moved ids in
    /// ascending order.
    pub fn reassign_all(&mut self, from: PeerId, to: PeerId) -> Vec<EntityId> {
        let moved = self.owned_by(&from);
        for entity in &moved {
            self.set_owner(*entity, to);
        }
        moved
    }

    pub fn owned_by(&self, peer: &PeerId) -> Vec<EntityId> {
        let mut owned: Vec<EntityId> = self
            .owners
            .iter()
            .filter(|(_, owner)| *owner == peer)
            .map(|(entity, _)| *entity)
            .collect();
        owned.sort();
        owned
    }

    pub fn begin_handoff(&mut self, entity: EntityId) {
        self.awaiting_handoff.insert(entity);
    }

    /// Returns `false` if the entity was not waiting on a handoff.
    pub fn end_handoff(&mut self, entity: &EntityId) -> bool {
        self.awaiting_handoff.remove(entity)
    }

    /// Mutations on a blocked entity must wait: either the master has not
    /// announced the snapshots of a departed owner yet, or the master asked
    /// for a transfer that has not arrived.
    pub fn is_blocked(&self, entity: &EntityId) -> bool {
        self.awaiting_handoff.contains(entity) || self.transfer_pending.contains_key(entity)
    }
}
