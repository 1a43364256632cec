use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::MutationError,
    payload::lifecycle::{EntityLifecycleEvent, Lifecycle},
    types::EntityId,
};

/// One group of enemies that must all be defeated before the level scrolls on
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    pub remaining: BTreeSet<EntityId>,
    pub completed: bool,
}

impl Wave {
    pub fn new(enemies: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            remaining: enemies.into_iter().collect(),
            completed: false,
        }
    }
}

/// Progress of a level through its enemy waves
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveProgress {
    pub current_wave: u32,
    pub waves: Vec<Wave>,
}

impl WaveProgress {
    pub fn new(waves: Vec<Wave>) -> Self {
        Self {
            current_wave: 0,
            waves,
        }
    }

    pub fn all_completed(&self) -> bool {
        self.current_wave as usize >= self.waves.len()
    }

    pub fn current(&self) -> Option<&Wave> {
        self.waves.get(self.current_wave as usize)
    }

    /// Removes a defeated enemy from the running wave, advancing once the
    /// wave is empty.
    pub fn enemy_defeated(&mut self, enemy: EntityId) -> Result<(), MutationError> {
        let wave_index = self.current_wave;
        let Some(wave) = self.waves.get_mut(wave_index as usize) else {
            return Err(MutationError::AllWavesCompleted);
        };
        if !wave.remaining.remove(&enemy) {
            return Err(MutationError::EnemyNotInWave {
                enemy,
                wave: wave_index,
            });
        }
        if wave.remaining.is_empty() {
            self.complete_current();
        }
        Ok(())
    }

    /// Forces the running wave to complete, e.g. when an area trigger is
    /// crossed.
    pub fn advance(&mut self) -> Result<(), MutationError> {
        let Some(wave) = self.waves.get_mut(self.current_wave as usize) else {
            return Err(MutationError::AllWavesCompleted);
        };
        wave.remaining.clear();
        self.complete_current();
        Ok(())
    }

    fn complete_current(&mut self) {
        if let Some(wave) = self.waves.get_mut(self.current_wave as usize) {
            wave.completed = true;
        }
        self.current_wave += 1;
    }
}

impl Lifecycle for WaveProgress {
    fn transitions(&self, previous: &Self, events: &mut Vec<EntityLifecycleEvent>) {
        for (index, wave) in self.waves.iter().enumerate() {
            let was_completed = previous
                .waves
                .get(index)
                .map(|wave| wave.completed)
                .unwrap_or(false);
            if wave.completed && !was_completed {
                events.push(EntityLifecycleEvent::WaveCompleted(index as u32));
            }
        }
        if self.current_wave != previous.current_wave {
            if self.all_completed() {
                if !previous.all_completed() {
                    events.push(EntityLifecycleEvent::AllWavesCompleted);
                }
            } else {
                events.push(EntityLifecycleEvent::WaveStarted(self.current_wave));
            }
        }
    }
}
