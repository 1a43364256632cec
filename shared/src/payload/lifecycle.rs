use crate::{
    payload::{loadout::Weapon, pickup::PickupItem, tactic::EnemyTactic},
    types::PeerId,
};

/// Notable transitions of an entity's replicated state
///
/// Every peer derives the same events from the same authoritative transition,
/// so gameplay hooks (death animation, wave banners, pickup effects) fire
/// identically on owners and observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityLifecycleEvent {
    Died,
    Revived,
    WaveStarted(u32),
    WaveCompleted(u32),
    AllWavesCompleted,
    TacticChanged(EnemyTactic),
    PickupConsumed { by: PeerId, item: PickupItem },
    WeaponEquipped(Weapon),
    WeaponBroken(String),
}

/// Capability of a payload type to describe what changed between two of its
/// states
pub trait Lifecycle {
    fn transitions(&self, previous: &Self, events: &mut Vec<EntityLifecycleEvent>);
}
