use serde::{Deserialize, Serialize};

use crate::{
    error::MutationError,
    payload::{
        lifecycle::{EntityLifecycleEvent, Lifecycle},
        loadout::Weapon,
        Mutation,
    },
    types::PeerId,
};

/// What a pickup grants to whoever takes it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickupItem {
    Health { restore_hp: u32 },
    Weapon(Weapon),
}

impl PickupItem {
    /// The mutation the consumer applies to its own player entity once the
    /// pickup is confirmed.
    pub fn reward(&self) -> Mutation {
        match self {
            PickupItem::Health { restore_hp } => Mutation::Heal(*restore_hp),
            PickupItem::Weapon(weapon) => Mutation::EquipWeapon(weapon.clone()),
        }
    }
}

/// A world item that can be taken exactly once
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pickup {
    pub item: PickupItem,
    pub consumed_by: Option<PeerId>,
}

impl Pickup {
    pub fn new(item: PickupItem) -> Self {
        Self {
            item,
            consumed_by: None,
        }
    }

    pub fn consume(&mut self, by: PeerId) -> Result<(), MutationError> {
        if let Some(previous) = self.consumed_by {
            return Err(MutationError::AlreadyConsumed { by: previous });
        }
        self.consumed_by = Some(by);
        Ok(())
    }
}

impl Lifecycle for Pickup {
    fn transitions(&self, previous: &Self, events: &mut Vec<EntityLifecycleEvent>) {
        if let (Some(by), None) = (self.consumed_by, previous.consumed_by) {
            events.push(EntityLifecycleEvent::PickupConsumed {
                by,
                item: self.item.clone(),
            });
        }
    }
}
