//! Replicated gameplay state and the mutations that change it
//!
//! A [`Payload`] is the domain state held by one replicated entity. It only
//! changes through [`Payload::apply`] on the owning peer; everyone else
//! receives the resulting payload whole, so derived rules (clamping, wave
//! advancement, weapon breakage) are evaluated exactly once, by the owner.

pub mod health;
pub mod lifecycle;
pub mod loadout;
pub mod pickup;
pub mod tactic;
pub mod wave;

use serde::{Deserialize, Serialize};

use crate::{
    error::MutationError,
    types::{EntityId, PeerId},
};
use health::Health;
use lifecycle::{EntityLifecycleEvent, Lifecycle};
use loadout::{Loadout, Weapon};
use pickup::Pickup;
use tactic::EnemyTactic;
use wave::WaveProgress;

/// The replicated state of an entity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Health(Health),
    WaveProgress(WaveProgress),
    Tactic(EnemyTactic),
    Pickup(Pickup),
    Loadout(Loadout),
}

/// A requested change to a payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    Damage(u32),
    Heal(u32),
    SetInvulnerable(bool),
    EnemyDefeated(EntityId),
    AdvanceWave,
    SetTactic(EnemyTactic),
    Consume { by: PeerId },
    EquipWeapon(Weapon),
    UseWeapon,
    HitWithWeapon,
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Damage(_) => "Damage",
            Mutation::Heal(_) => "Heal",
            Mutation::SetInvulnerable(_) => "SetInvulnerable",
            Mutation::EnemyDefeated(_) => "EnemyDefeated",
            Mutation::AdvanceWave => "AdvanceWave",
            Mutation::SetTactic(_) => "SetTactic",
            Mutation::Consume { .. } => "Consume",
            Mutation::EquipWeapon(_) => "EquipWeapon",
            Mutation::UseWeapon => "UseWeapon",
            Mutation::HitWithWeapon => "HitWithWeapon",
        }
    }
}

impl Payload {
    pub fn name(&self) -> &'static str {
        match self {
            Payload::Health(_) => "Health",
            Payload::WaveProgress(_) => "WaveProgress",
            Payload::Tactic(_) => "Tactic",
            Payload::Pickup(_) => "Pickup",
            Payload::Loadout(_) => "Loadout",
        }
    }

    /// Applies a mutation atomically: on error the payload is unchanged.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<(), MutationError> {
        let mut next = self.clone();
        next.apply_in_place(mutation)?;
        *self = next;
        Ok(())
    }

    fn apply_in_place(&mut self, mutation: &Mutation) -> Result<(), MutationError> {
        match (self, mutation) {
            (Payload::Health(health), Mutation::Damage(amount)) => health.damage(*amount),
            (Payload::Health(health), Mutation::Heal(amount)) => health.heal(*amount),
            (Payload::Health(health), Mutation::SetInvulnerable(value)) => {
                health.set_invulnerable(*value)
            }
            (Payload::WaveProgress(progress), Mutation::EnemyDefeated(enemy)) => {
                progress.enemy_defeated(*enemy)?
            }
            (Payload::WaveProgress(progress), Mutation::AdvanceWave) => progress.advance()?,
            (Payload::Tactic(tactic), Mutation::SetTactic(next)) => *tactic = *next,
            (Payload::Pickup(pickup), Mutation::Consume { by }) => pickup.consume(*by)?,
            (Payload::Loadout(loadout), Mutation::EquipWeapon(weapon)) => {
                loadout.equip(weapon.clone())
            }
            (Payload::Loadout(loadout), Mutation::UseWeapon) => loadout.use_weapon()?,
            (Payload::Loadout(loadout), Mutation::HitWithWeapon) => loadout.hit_with_weapon()?,
            (payload, mutation) => {
                return Err(MutationError::KindMismatch {
                    mutation: mutation.name().to_string(),
                    payload: payload.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Lifecycle events produced by moving from `previous` to `self`.
    ///
    /// A change of payload kind is not a transition and yields nothing.
    pub fn transitions(&self, previous: &Payload) -> Vec<EntityLifecycleEvent> {
        let mut events = Vec::new();
        match (self, previous) {
            (Payload::Health(next), Payload::Health(prev)) => next.transitions(prev, &mut events),
            (Payload::WaveProgress(next), Payload::WaveProgress(prev)) => {
                next.transitions(prev, &mut events)
            }
            (Payload::Tactic(next), Payload::Tactic(prev)) => next.transitions(prev, &mut events),
            (Payload::Pickup(next), Payload::Pickup(prev)) => next.transitions(prev, &mut events),
            (Payload::Loadout(next), Payload::Loadout(prev)) => {
                next.transitions(prev, &mut events)
            }
            _ => {}
        }
        events
    }

    pub fn as_health(&self) -> Option<&Health> {
        match self {
            Payload::Health(health) => Some(health),
            _ => None,
        }
    }

    pub fn as_wave_progress(&self) -> Option<&WaveProgress> {
        match self {
            Payload::WaveProgress(progress) => Some(progress),
            _ => None,
        }
    }

    pub fn as_pickup(&self) -> Option<&Pickup> {
        match self {
            Payload::Pickup(pickup) => Some(pickup),
            _ => None,
        }
    }

    pub fn as_loadout(&self) -> Option<&Loadout> {
        match self {
            Payload::Loadout(loadout) => Some(loadout),
            _ => None,
        }
    }

    pub fn as_tactic(&self) -> Option<EnemyTactic> {
        match self {
            Payload::Tactic(tactic) => Some(*tactic),
            _ => None,
        }
    }
}
