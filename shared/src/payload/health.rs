use serde::{Deserialize, Serialize};

use crate::payload::lifecycle::{EntityLifecycleEvent, Lifecycle};

/// Hit points of a player, enemy or breakable object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub current_hp: u32,
    pub max_hp: u32,
    pub invulnerable: bool,
}

impl Health {
    pub fn new(max_hp: u32) -> Self {
        Self {
            current_hp: max_hp,
            max_hp,
            invulnerable: false,
        }
    }

    pub fn with_current(current_hp: u32, max_hp: u32) -> Self {
        Self {
            current_hp: current_hp.min(max_hp),
            max_hp,
            invulnerable: false,
        }
    }

    /// Clamps at zero. Invulnerable entities ignore damage entirely.
    pub fn damage(&mut self, amount: u32) {
        if self.invulnerable {
            return;
        }
        self.current_hp = self.current_hp.saturating_sub(amount);
    }

    /// Clamps at `max_hp`.
    pub fn heal(&mut self, amount: u32) {
        self.current_hp = self.current_hp.saturating_add(amount).min(self.max_hp);
    }

    pub fn set_invulnerable(&mut self, invulnerable: bool) {
        self.invulnerable = invulnerable;
    }

    pub fn is_dead(&self) -> bool {
        self.current_hp == 0
    }

    /// Fraction of health left, for health bars.
    pub fn fraction(&self) -> f32 {
        if self.max_hp == 0 {
            return 0.0;
        }
        self.current_hp as f32 / self.max_hp as f32
    }
}

impl Lifecycle for Health {
    fn transitions(&self, previous: &Self, events: &mut Vec<EntityLifecycleEvent>) {
        if self.is_dead() && !previous.is_dead() {
            events.push(EntityLifecycleEvent::Died);
        } else if !self.is_dead() && previous.is_dead() {
            events.push(EntityLifecycleEvent::Revived);
        }
    }
}
