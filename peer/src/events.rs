use std::mem;

use brawlsync_shared::{
    EntityId, EntityLifecycleEvent, MutationError, PeerId, ReplicationError, RequestId, Version,
};

use crate::error::PeerError;

/// How a mutation request ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The owner applied the mutation; this is the resulting version
    Confirmed { version: Version },
    /// The owner refused the mutation; nothing changed
    Rejected { reason: MutationError },
    /// The owner never answered. The mutation only shows on the local view
    /// until the next authoritative update
    Speculative { error: ReplicationError },
    /// The entity was despawned or changed owner first
    Cancelled { error: ReplicationError },
}

impl MutationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MutationOutcome::Confirmed { .. })
    }
}

/// Everything that happened on a peer since the host last drained it
pub struct PeerEvents {
    outcomes: Vec<(RequestId, EntityId, MutationOutcome)>,
    lifecycle: Vec<(EntityId, EntityLifecycleEvent)>,
    spawns: Vec<EntityId>,
    despawns: Vec<EntityId>,
    updates: Vec<(EntityId, Version)>,
    ownership_changes: Vec<(EntityId, PeerId)>,
    joins: Vec<PeerId>,
    departures: Vec<PeerId>,
    master_changes: Vec<PeerId>,
    errors: Vec<PeerError>,
}

impl Default for PeerEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerEvents {
    pub(crate) fn new() -> Self {
        Self {
            outcomes: Vec::new(),
            lifecycle: Vec::new(),
            spawns: Vec::new(),
            despawns: Vec::new(),
            updates: Vec::new(),
            ownership_changes: Vec::new(),
            joins: Vec::new(),
            departures: Vec::new(),
            master_changes: Vec::new(),
            errors: Vec::new(),
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
            && self.lifecycle.is_empty()
            && self.spawns.is_empty()
            && self.despawns.is_empty()
            && self.updates.is_empty()
            && self.ownership_changes.is_empty()
            && self.joins.is_empty()
            && self.departures.is_empty()
            && self.master_changes.is_empty()
            && self.errors.is_empty()
    }

    pub fn take_outcomes(&mut self) -> Vec<(RequestId, EntityId, MutationOutcome)> {
        mem::take(&mut self.outcomes)
    }

    pub fn take_lifecycle(&mut self) -> Vec<(EntityId, EntityLifecycleEvent)> {
        mem::take(&mut self.lifecycle)
    }

    pub fn take_spawns(&mut self) -> Vec<EntityId> {
        mem::take(&mut self.spawns)
    }

    pub fn take_despawns(&mut self) -> Vec<EntityId> {
        mem::take(&mut self.despawns)
    }

    pub fn take_updates(&mut self) -> Vec<(EntityId, Version)> {
        mem::take(&mut self.updates)
    }

    /// Entities whose owner changed, with the new owner
    pub fn take_ownership_changes(&mut self) -> Vec<(EntityId, PeerId)> {
        mem::take(&mut self.ownership_changes)
    }

    pub fn take_joins(&mut self) -> Vec<PeerId> {
        mem::take(&mut self.joins)
    }

    pub fn take_departures(&mut self) -> Vec<PeerId> {
        mem::take(&mut self.departures)
    }

    pub fn take_master_changes(&mut self) -> Vec<PeerId> {
        mem::take(&mut self.master_changes)
    }

    pub fn take_errors(&mut self) -> Vec<PeerError> {
        mem::take(&mut self.errors)
    }

    // Crate-public

    pub(crate) fn push_outcome(
        &mut self,
        request_id: RequestId,
        entity: EntityId,
        outcome: MutationOutcome,
    ) {
        self.outcomes.push((request_id, entity, outcome));
    }

    pub(crate) fn push_lifecycle(
        &mut self,
        entity: EntityId,
        events: impl IntoIterator<Item = EntityLifecycleEvent>,
    ) {
        self.lifecycle
            .extend(events.into_iter().map(|event| (entity, event)));
    }

    pub(crate) fn push_spawn(&mut self, entity: EntityId) {
        self.spawns.push(entity);
    }

    pub(crate) fn push_despawn(&mut self, entity: EntityId) {
        self.despawns.push(entity);
    }

    pub(crate) fn push_update(&mut self, entity: EntityId, version: Version) {
        self.updates.push((entity, version));
    }

    pub(crate) fn push_ownership_change(&mut self, entity: EntityId, owner: PeerId) {
        self.ownership_changes.push((entity, owner));
    }

    pub(crate) fn push_join(&mut self, peer: PeerId) {
        self.joins.push(peer);
    }

    pub(crate) fn push_departure(&mut self, peer: PeerId) {
        self.departures.push(peer);
    }

    pub(crate) fn push_master_change(&mut self, master: PeerId) {
        self.master_changes.push(master);
    }

    pub(crate) fn push_error(&mut self, error: impl Into<PeerError>) {
        self.errors.push(error.into());
    }
}
