use serde::{Deserialize, Serialize};

use crate::{
    error::MutationError,
    payload::lifecycle::{EntityLifecycleEvent, Lifecycle},
};

/// When a weapon loses durability
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Degenerate {
    /// Every swing or shot counts (guns)
    OnUse,
    /// Only connecting hits count (clubs)
    OnHit,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    pub uses_left: u32,
    pub degenerate: Degenerate,
}

impl Weapon {
    pub fn new(name: impl Into<String>, uses_left: u32, degenerate: Degenerate) -> Self {
        Self {
            name: name.into(),
            uses_left,
            degenerate,
        }
    }
}

/// The weapon a player is currently holding
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    pub weapon: Option<Weapon>,
}

impl Loadout {
    pub fn equip(&mut self, weapon: Weapon) {
        self.weapon = Some(weapon);
    }

    pub fn use_weapon(&mut self) -> Result<(), MutationError> {
        self.wear(Degenerate::OnUse)
    }

    pub fn hit_with_weapon(&mut self) -> Result<(), MutationError> {
        self.wear(Degenerate::OnHit)
    }

    // A weapon with no uses left breaks and is dropped.
    fn wear(&mut self, trigger: Degenerate) -> Result<(), MutationError> {
        let Some(weapon) = self.weapon.as_mut() else {
            return Err(MutationError::NoWeaponEquipped);
        };
        if weapon.degenerate != trigger {
            return Ok(());
        }
        weapon.uses_left = weapon.uses_left.saturating_sub(1);
        if weapon.uses_left == 0 {
            self.weapon = None;
        }
        Ok(())
    }
}

impl Lifecycle for Loadout {
    fn transitions(&self, previous: &Self, events: &mut Vec<EntityLifecycleEvent>) {
        match (&previous.weapon, &self.weapon) {
            (Some(old), None) => {
                events.push(EntityLifecycleEvent::WeaponBroken(old.name.clone()));
            }
            (None, Some(new)) => {
                events.push(EntityLifecycleEvent::WeaponEquipped(new.clone()));
            }
            (Some(old), Some(new)) => {
                if old.name != new.name || new.uses_left > old.uses_left {
                    events.push(EntityLifecycleEvent::WeaponEquipped(new.clone()));
                }
            }
            (None, None) => {}
        }
    }
}
