use serde::{Deserialize, Serialize};

use crate::payload::lifecycle::{EntityLifecycleEvent, Lifecycle};

/// How an enemy positions itself relative to its target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnemyTactic {
    Engage,
    KeepCloseDistance,
    KeepMediumDistance,
    KeepFarDistance,
    #[default]
    StandStill,
}

impl Lifecycle for EnemyTactic {
    fn transitions(&self, previous: &Self, events: &mut Vec<EntityLifecycleEvent>) {
        if self != previous {
            events.push(EntityLifecycleEvent::TacticChanged(*self));
        }
    }
}
