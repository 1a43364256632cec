use std::collections::{BTreeMap, HashSet};

use brawlsync_shared::{EntityId, PeerId, ReplicationError};

use crate::entity::ReplicatedEntity;

/// Every entity this peer replicates, plus the ids it hands out
pub struct EntityWorld {
    local: PeerId,
    incarnation: u64,
    next_serial: u32,
    entities: BTreeMap<EntityId, ReplicatedEntity>,
    despawned: HashSet<EntityId>,
}

impl EntityWorld {
    pub fn new(local: PeerId, incarnation: u64) -> Self {
        Self {
            local,
            incarnation,
            next_serial: 1,
            entities: BTreeMap::new(),
            despawned: HashSet::new(),
        }
    }

    /// A fresh id for an entity created by this peer. Serials are never
    /// handed out twice within an incarnation.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = EntityId::with_incarnation(self.local, self.incarnation, self.next_serial);
        self.next_serial += 1;
        id
    }

    pub fn insert(&mut self, entity: ReplicatedEntity) -> Result<(), ReplicationError> {
        let id = entity.id();
        if self.entities.contains_key(&id) || self.despawned.contains(&id) {
            return Err(ReplicationError::EntityAlreadyExists { entity: id });
        }
        self.entities.insert(id, entity);
        Ok(())
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<ReplicatedEntity> {
        let removed = self.entities.remove(id);
        if removed.is_some() {
            self.despawned.insert(*id);
        }
        removed
    }

    /// Takes back an insert whose spawn was never announced. Unlike
    /// [`EntityWorld::remove`] the id is not remembered as despawned.
    pub fn discard(&mut self, id: &EntityId) -> Option<ReplicatedEntity> {
        self.entities.remove(id)
    }

    pub fn get(&self, id: &EntityId) -> Option<&ReplicatedEntity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut ReplicatedEntity> {
        self.entities.get_mut(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Despawned ids stay known so late messages about them are dropped
    /// instead of waiting for a spawn that will never come.
    pub fn was_despawned(&self, id: &EntityId) -> bool {
        self.despawned.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
