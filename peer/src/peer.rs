use std::{
    collections::{HashMap, HashSet},
    mem,
    time::Instant,
};

use log::{debug, info, trace, warn};

use brawlsync_shared::{
    EntityId, EntitySnapshot, Mutation, NetMessage, Payload, PeerId, ReplicationError, RequestId,
    RequestOrigin, Version,
};

use crate::{
    channel::{CommandChannel, Targets, Transport},
    config::PeerConfig,
    coordinator::{AuthorityCoordinator, RequestState, Route, TimeoutAction},
    entity::{RemoteApply, ReplicatedEntity},
    error::PeerError,
    events::{MutationOutcome, PeerEvents},
    membership::{SessionInfo, SessionMembership},
    ownership::{OwnershipRegistry, TransferPlan},
    waitlist::EntityWaitlist,
    world::EntityWorld,
};

/// One participant of a replicated session
///
/// A `Peer` is driven by the host's loop: call [`Peer::receive_all`] to
/// process whatever arrived, issue mutations, then call [`Peer::send_all`] to
/// handle timeouts and put packets on the wire. Everything that happened is
/// collected in [`PeerEvents`].
pub struct Peer<T: Transport> {
    config: PeerConfig,
    membership: SessionMembership,
    registry: OwnershipRegistry,
    world: EntityWorld,
    coordinator: AuthorityCoordinator,
    channel: CommandChannel<T>,
    waitlist: EntityWaitlist,
    handoffs: HashMap<PeerId, Vec<EntityId>>,
    departed: HashSet<PeerId>,
    events: PeerEvents,
}

impl<T: Transport> Peer<T> {
    /// Create a new Peer for the session described by `session`
    pub fn new(config: PeerConfig, session: SessionInfo, transport: T) -> Result<Self, PeerError> {
        let membership = SessionMembership::new(session)?;
        let local = membership.local();
        let channel = CommandChannel::new(
            local,
            membership.remote_peers(),
            transport,
            config.channel.clone(),
        );
        // never zero, so ids built without an incarnation cannot collide
        let incarnation = fastrand::u64(1..);
        info!(
            "{} starting with master {} (incarnation {:x})",
            local,
            membership.current_master(),
            incarnation
        );

        Ok(Self {
            registry: OwnershipRegistry::new(local),
            world: EntityWorld::new(local, incarnation),
            coordinator: AuthorityCoordinator::new(config.authority.clone()),
            waitlist: EntityWaitlist::new(config.waitlist_ttl),
            channel,
            membership,
            config,
            handoffs: HashMap::new(),
            departed: HashSet::new(),
            events: PeerEvents::new(),
        })
    }

    // Session

    pub fn local(&self) -> PeerId {
        self.membership.local()
    }

    pub fn current_master(&self) -> PeerId {
        self.membership.current_master()
    }

    pub fn is_master(&self) -> bool {
        self.membership.is_master()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.membership.peers().collect()
    }

    /// Must be called when the presence service reports a new peer. Every
    /// entity this peer owns is sent to the newcomer.
    pub fn on_peer_joined(&mut self, peer: PeerId) -> Result<(), PeerError> {
        if !self.membership.on_peer_joined(peer) {
            return Ok(());
        }
        self.departed.remove(&peer);
        self.channel.add_peer(peer);
        self.events.push_join(peer);

        let local = self.local();
        for entity in self.registry.owned_by(&local) {
            if let Some(replica) = self.world.get(&entity) {
                self.channel
                    .send(Targets::Single(peer), NetMessage::SpawnEntity(replica.snapshot()))?;
            }
        }
        Ok(())
    }

    /// Must be called when the presence service reports that a peer left.
    /// The departed peer's entities move to the master right away.
    pub fn on_peer_departed(&mut self, peer: PeerId, now: &Instant) -> Result<(), PeerError> {
        if self.departed.contains(&peer) {
            debug!("departure of {} was already processed", peer);
            return Ok(());
        }
        self.process_departure(peer, now)
    }

    // Entities

    /// Spawns an entity owned by `owner`. Any peer may spawn for itself;
    /// only the master may spawn on behalf of another peer.
    pub fn spawn_entity(&mut self, payload: Payload, owner: PeerId) -> Result<EntityId, PeerError> {
        if !self.membership.contains(&owner) {
            return Err(ReplicationError::UnknownPeer { peer: owner }.into());
        }
        let local = self.local();
        if owner != local && !self.membership.is_master() {
            return Err(ReplicationError::NotAuthorizedToSpawn {
                peer: local,
                owner,
            }
            .into());
        }

        let id = self.world.allocate_id();
        let replica = ReplicatedEntity::new(id, owner, payload);
        let spawn = NetMessage::SpawnEntity(replica.snapshot());
        self.world.insert(replica)?;
        if let Err(error) = self.registry.register(id, owner) {
            self.world.discard(&id);
            return Err(error.into());
        }
        if let Err(error) = self.channel.send(Targets::AllExceptSender, spawn) {
            self.world.discard(&id);
            self.registry.deregister(&id);
            return Err(error.into());
        }
        info!("{} spawned {} for {}", local, id, owner);
        self.events.push_spawn(id);
        Ok(id)
    }

    /// Despawns an entity this peer owns.
    pub fn despawn_entity(&mut self, entity: &EntityId) -> Result<(), PeerError> {
        if !self.world.contains(entity) {
            return Err(ReplicationError::UnknownEntity {
                entity: *entity,
                operation: "despawn_entity",
            }
            .into());
        }
        let owner = self.registry.owner_of(entity)?;
        if !self.registry.is_owned_locally(entity) {
            return Err(ReplicationError::NotOwner {
                entity: *entity,
                owner,
                operation: "despawn_entity",
            }
            .into());
        }
        self.channel.send(
            Targets::AllExceptSender,
            NetMessage::DespawnEntity { entity: *entity },
        )?;
        self.remove_entity(entity);
        Ok(())
    }

    pub fn entity(&self, entity: &EntityId) -> Option<&ReplicatedEntity> {
        self.world.get(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.world.ids()
    }

    pub fn owner_of(&self, entity: &EntityId) -> Result<PeerId, ReplicationError> {
        self.registry.owner_of(entity)
    }

    // Mutations

    /// Requests a mutation of `entity`.
    ///
    /// Returns right away with the id of the request. The outcome shows up in
    /// [`PeerEvents::take_outcomes`]: at once if this peer owns the entity,
    /// after the owner's answer otherwise.
    pub fn mutate(
        &mut self,
        entity: &EntityId,
        mutation: Mutation,
        now: &Instant,
    ) -> Result<RequestId, PeerError> {
        let Some(replica) = self.world.get(entity) else {
            return Err(ReplicationError::UnknownEntity {
                entity: *entity,
                operation: "mutate",
            }
            .into());
        };
        let mut route = self.coordinator.route(&self.registry, entity)?;
        if route == Route::ApplyLocal && replica.awaiting_resync() {
            route = Route::Queue;
        }

        let local = self.local();
        let request_id = self.coordinator.next_request_id();
        let origin = RequestOrigin::new(local, request_id);
        trace!("{} requests {} on {}", local, mutation.name(), entity);

        match route {
            Route::ApplyLocal => {
                self.coordinator.track_local(request_id);
                self.apply_as_owner(*entity, origin, mutation)?;
            }
            Route::Forward { owner } => {
                self.channel.send(
                    Targets::Single(owner),
                    NetMessage::MutationRequest {
                        entity: *entity,
                        requested_by: local,
                        request_id,
                        mutation: mutation.clone(),
                    },
                )?;
                self.coordinator
                    .track_forwarded(request_id, *entity, owner, mutation, now);
            }
            Route::Queue => {
                self.registry.queue(
                    *entity,
                    local,
                    NetMessage::MutationRequest {
                        entity: *entity,
                        requested_by: local,
                        request_id,
                        mutation: mutation.clone(),
                    },
                );
                self.coordinator.track_queued(request_id, *entity, mutation);
            }
        }
        Ok(request_id)
    }

    pub fn request_state(&self, request_id: &RequestId) -> Option<RequestState> {
        self.coordinator.state(request_id)
    }

    /// Moves write authority over `entity` to `new_owner`. Only the owner and
    /// the master may do this.
    pub fn transfer_ownership(
        &mut self,
        entity: &EntityId,
        new_owner: PeerId,
    ) -> Result<(), PeerError> {
        if !self.world.contains(entity) {
            return Err(ReplicationError::UnknownEntity {
                entity: *entity,
                operation: "transfer_ownership",
            }
            .into());
        }
        if !self.membership.contains(&new_owner) {
            return Err(ReplicationError::UnknownPeer { peer: new_owner }.into());
        }
        let local = self.local();
        let master = self.membership.current_master();
        match self.registry.transfer(*entity, local, master, new_owner)? {
            TransferPlan::Apply { old_owner } => {
                self.announce_transfer(*entity, old_owner, new_owner)
            }
            TransferPlan::Delegate { owner } => {
                self.channel.send(
                    Targets::Single(owner),
                    NetMessage::TransferRequest {
                        entity: *entity,
                        new_owner,
                    },
                )?;
                Ok(())
            }
            TransferPlan::Unchanged => {
                debug!("{} already belongs to {}", entity, new_owner);
                Ok(())
            }
        }
    }

    // Loop

    /// Reads everything the transport has and processes it. Errors caused
    /// by a single message are reported through [`PeerEvents::take_errors`];
    /// only a failing transport aborts.
    pub fn receive_all(&mut self, now: &Instant) -> Result<(), PeerError> {
        for (from, message) in self.channel.receive()? {
            self.handle(from, message, now);
        }
        Ok(())
    }

    /// Handles confirmation timeouts, sends acknowledgements and due packets,
    /// and expires stale waitlist entries.
    pub fn send_all(&mut self, now: &Instant) -> Result<(), PeerError> {
        for action in self.coordinator.poll_timeouts(now) {
            match action {
                TimeoutAction::Resubmit {
                    request_id,
                    entity,
                    mutation,
                } => {
                    let Ok(owner) = self.registry.owner_of(&entity) else {
                        continue;
                    };
                    self.coordinator.retarget(&request_id, owner);
                    self.channel.send(
                        Targets::Single(owner),
                        NetMessage::MutationRequest {
                            entity,
                            requested_by: self.membership.local(),
                            request_id,
                            mutation,
                        },
                    )?;
                }
                TimeoutAction::GiveUp {
                    request_id,
                    entity,
                    owner,
                    mutation,
                } => {
                    if let Some(replica) = self.world.get_mut(&entity) {
                        if let Err(reason) = replica.apply_speculative(&mutation) {
                            debug!(
                                "speculative {} on {} has no effect: {}",
                                mutation.name(),
                                entity,
                                reason
                            );
                        }
                    }
                    self.events.push_outcome(
                        request_id,
                        entity,
                        MutationOutcome::Speculative {
                            error: ReplicationError::AuthorityUnreachable {
                                entity,
                                owner,
                                request_id,
                            },
                        },
                    );
                }
            }
        }

        self.channel.flush(now)?;
        self.waitlist.expire(now);
        Ok(())
    }

    pub fn take_events(&mut self) -> PeerEvents {
        mem::take(&mut self.events)
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn pending_requests(&self) -> usize {
        self.coordinator.pending_len()
    }

    pub fn waitlist_len(&self) -> usize {
        self.waitlist.len()
    }

    pub fn unacked_len(&self, peer: &PeerId) -> usize {
        self.channel.unacked_len(peer)
    }

    pub fn transport(&self) -> &T {
        self.channel.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.channel.transport_mut()
    }

    // Private

    fn handle(&mut self, from: PeerId, message: NetMessage, now: &Instant) {
        let name = message.name();
        if let Err(err) = self.process(from, message, now) {
            warn!("Peer Error: cannot process {} from {}: {}", name, from, err);
            self.events.push_error(err);
        }
    }

    fn process(
        &mut self,
        from: PeerId,
        message: NetMessage,
        now: &Instant,
    ) -> Result<(), PeerError> {
        trace!("{} processing {} from {}", self.local(), message.name(), from);

        if let Some(entity) = message.entity() {
            let needs_entity = !matches!(
                message,
                NetMessage::SpawnEntity(_)
                    | NetMessage::EntitySnapshot(_)
                    | NetMessage::MutationRejected { .. }
            );
            if needs_entity && !self.world.contains(&entity) {
                if self.world.was_despawned(&entity) {
                    debug!("dropping {} for despawned {}", message.name(), entity);
                } else {
                    self.waitlist.park(now, entity, from, message);
                }
                return Ok(());
            }
        }

        match message {
            NetMessage::MutationRequest {
                entity,
                requested_by,
                request_id,
                mutation,
            } => self.on_mutation_request(from, entity, requested_by, request_id, mutation, now),
            NetMessage::MutationBroadcast {
                entity,
                new_version,
                payload,
                cause,
            } => self.on_mutation_broadcast(from, entity, new_version, payload, cause),
            NetMessage::MutationRejected {
                entity,
                request_id,
                reason,
            } => {
                if let Some(outcome) = self.coordinator.reject(&request_id, reason) {
                    self.events.push_outcome(request_id, entity, outcome);
                }
                Ok(())
            }
            NetMessage::OwnershipTransfer {
                entity,
                old_owner,
                new_owner,
                at_version,
            } => self.on_ownership_transfer(from, entity, old_owner, new_owner, at_version, now),
            NetMessage::TransferRequest { entity, new_owner } => {
                self.on_transfer_request(from, entity, new_owner)
            }
            NetMessage::MasterReassigned {
                new_master,
                departed,
                reassigned,
            } => self.on_master_reassigned(new_master, departed, reassigned, now),
            NetMessage::SpawnEntity(snapshot) => self.adopt_spawn(snapshot, now),
            NetMessage::DespawnEntity { entity } => {
                let owner = self.registry.owner_of(&entity)?;
                if from != owner {
                    self.registry
                        .queue(entity, from, NetMessage::DespawnEntity { entity });
                    return Ok(());
                }
                self.remove_entity(&entity);
                Ok(())
            }
            NetMessage::ResyncRequest { entity } => {
                if let Some(replica) = self.world.get(&entity) {
                    debug!("sending snapshot of {} to {}", entity, from);
                    let snapshot = NetMessage::EntitySnapshot(replica.snapshot());
                    self.channel.send(Targets::Single(from), snapshot)?;
                }
                Ok(())
            }
            NetMessage::EntitySnapshot(snapshot) => self.on_snapshot(from, snapshot, now),
        }
    }

    fn on_mutation_request(
        &mut self,
        from: PeerId,
        entity: EntityId,
        requested_by: PeerId,
        request_id: RequestId,
        mutation: Mutation,
        now: &Instant,
    ) -> Result<(), PeerError> {
        let local = self.local();
        let resyncing = self
            .world
            .get(&entity)
            .map(ReplicatedEntity::awaiting_resync)
            .unwrap_or(false);
        let owned = self.registry.is_owned_locally(&entity);

        if self.registry.is_blocked(&entity) || (owned && resyncing) {
            self.registry.queue(
                entity,
                from,
                NetMessage::MutationRequest {
                    entity,
                    requested_by,
                    request_id,
                    mutation,
                },
            );
            return Ok(());
        }

        if owned {
            if requested_by == local {
                self.coordinator.promote_to_local(&request_id);
            }
            let origin = RequestOrigin::new(requested_by, request_id);
            return self.apply_as_owner(entity, origin, mutation);
        }

        if requested_by == local {
            // one of ours, queued until the entity was unblocked
            if self.coordinator.state(&request_id) != Some(RequestState::Requested) {
                return Ok(());
            }
            let owner = self.registry.owner_of(&entity)?;
            self.channel.send(
                Targets::Single(owner),
                NetMessage::MutationRequest {
                    entity,
                    requested_by,
                    request_id,
                    mutation: mutation.clone(),
                },
            )?;
            self.coordinator
                .track_forwarded(request_id, entity, owner, mutation, now);
            return Ok(());
        }

        if self.registry.was_relinquished(&entity) {
            debug!(
                "{} no longer owns {}, dropping request {:?} from {}",
                local, entity, request_id, requested_by
            );
            return Ok(());
        }

        self.registry.queue(
            entity,
            from,
            NetMessage::MutationRequest {
                entity,
                requested_by,
                request_id,
                mutation,
            },
        );
        Ok(())
    }

    fn apply_as_owner(
        &mut self,
        entity: EntityId,
        origin: RequestOrigin,
        mutation: Mutation,
    ) -> Result<(), PeerError> {
        let local = self.local();
        let Some(replica) = self.world.get_mut(&entity) else {
            return Err(ReplicationError::UnknownEntity {
                entity,
                operation: "apply_local",
            }
            .into());
        };

        match replica.apply_local(local, origin, &mutation, self.config.ledger_window) {
            Ok(applied) => {
                let payload = replica.payload().clone();
                self.events.push_lifecycle(entity, applied.events);
                self.events.push_update(entity, applied.version);
                self.channel.send(
                    Targets::AllExceptSender,
                    NetMessage::MutationBroadcast {
                        entity,
                        new_version: applied.version,
                        payload,
                        cause: Some(origin),
                    },
                )?;
                if origin.peer == local {
                    let confirmed = self.coordinator.confirm(&origin.request_id, applied.version);
                    if let Some(outcome) = confirmed {
                        self.events.push_outcome(origin.request_id, entity, outcome);
                    }
                }
                Ok(())
            }
            Err(ReplicationError::Rejected { reason, .. }) => {
                debug!(
                    "{} rejects {} from {}: {}",
                    entity,
                    mutation.name(),
                    origin.peer,
                    reason
                );
                if origin.peer == local {
                    if let Some(outcome) = self.coordinator.reject(&origin.request_id, reason) {
                        self.events.push_outcome(origin.request_id, entity, outcome);
                    }
                } else {
                    self.channel.send(
                        Targets::Single(origin.peer),
                        NetMessage::MutationRejected {
                            entity,
                            request_id: origin.request_id,
                            reason,
                        },
                    )?;
                }
                Ok(())
            }
            Err(ReplicationError::Duplicate { .. }) => {
                debug!(
                    "dropping duplicate request {:?} from {} on {}",
                    origin.request_id, origin.peer, entity
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn on_mutation_broadcast(
        &mut self,
        from: PeerId,
        entity: EntityId,
        new_version: Version,
        payload: Payload,
        cause: Option<RequestOrigin>,
    ) -> Result<(), PeerError> {
        let owner = self.registry.owner_of(&entity)?;
        if from != owner {
            self.registry.queue(
                entity,
                from,
                NetMessage::MutationBroadcast {
                    entity,
                    new_version,
                    payload,
                    cause,
                },
            );
            return Ok(());
        }
        let Some(replica) = self.world.get_mut(&entity) else {
            return Ok(());
        };

        match replica.apply_remote(new_version, payload, cause, self.config.ledger_window) {
            Ok(RemoteApply::Applied(applied)) => {
                self.events.push_lifecycle(entity, applied.events);
                self.events.push_update(entity, applied.version);
            }
            Ok(RemoteApply::Stale) | Ok(RemoteApply::Ignored) => {}
            Err(err @ ReplicationError::OutOfSync { .. }) => {
                info!("requesting resync of {} from {}", entity, owner);
                self.channel
                    .send(Targets::Single(owner), NetMessage::ResyncRequest { entity })?;
                self.events.push_error(err);
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(origin) = cause {
            if origin.peer == self.membership.local() {
                if let Some(outcome) = self.coordinator.confirm(&origin.request_id, new_version) {
                    self.events.push_outcome(origin.request_id, entity, outcome);
                }
            }
        }
        Ok(())
    }

    fn on_ownership_transfer(
        &mut self,
        from: PeerId,
        entity: EntityId,
        old_owner: PeerId,
        new_owner: PeerId,
        at_version: Version,
        now: &Instant,
    ) -> Result<(), PeerError> {
        let owner = self.registry.owner_of(&entity)?;
        if from != owner {
            self.registry.queue(
                entity,
                from,
                NetMessage::OwnershipTransfer {
                    entity,
                    old_owner,
                    new_owner,
                    at_version,
                },
            );
            return Ok(());
        }
        if old_owner != from {
            warn!(
                "Peer Error: transfer of {} names {} as old owner but came from {}",
                entity, old_owner, from
            );
        }

        let new_owner = self.surviving_or_master(new_owner);
        self.adopt_owner(entity, new_owner);

        let local = self.local();
        if let Some(replica) = self.world.get_mut(&entity) {
            if replica.version() != at_version {
                let source = if new_owner == local { from } else { new_owner };
                info!(
                    "{} is at {} but was transferred at {}, requesting resync from {}",
                    entity,
                    replica.version(),
                    at_version,
                    source
                );
                replica.mark_awaiting_resync();
                self.channel
                    .send(Targets::Single(source), NetMessage::ResyncRequest { entity })?;
            }
        }

        self.drain_queued(&entity, now);
        Ok(())
    }

    fn on_transfer_request(
        &mut self,
        from: PeerId,
        entity: EntityId,
        new_owner: PeerId,
    ) -> Result<(), PeerError> {
        let master = self.membership.current_master();
        if from != master {
            return Err(ReplicationError::NotAuthorized {
                entity,
                peer: from,
                operation: "transfer",
            }
            .into());
        }

        if self.registry.is_owned_locally(&entity) {
            let local = self.local();
            let new_owner = self.surviving_or_master(new_owner);
            return match self.registry.transfer(entity, local, master, new_owner)? {
                TransferPlan::Apply { old_owner } => {
                    self.announce_transfer(entity, old_owner, new_owner)
                }
                // the master is still waiting on an answer
                _ => self.announce_transfer(entity, local, local),
            };
        }

        if self.registry.was_relinquished(&entity) {
            debug!(
                "{} already handed {} over, ignoring transfer request",
                self.local(),
                entity
            );
            return Ok(());
        }

        self.registry
            .queue(entity, from, NetMessage::TransferRequest { entity, new_owner });
        Ok(())
    }

    fn announce_transfer(
        &mut self,
        entity: EntityId,
        old_owner: PeerId,
        new_owner: PeerId,
    ) -> Result<(), PeerError> {
        let Some(at_version) = self.world.get(&entity).map(ReplicatedEntity::version) else {
            return Err(ReplicationError::UnknownEntity {
                entity,
                operation: "transfer_ownership",
            }
            .into());
        };
        let announced = self.channel.send(
            Targets::AllExceptSender,
            NetMessage::OwnershipTransfer {
                entity,
                old_owner,
                new_owner,
                at_version,
            },
        );
        if let Err(error) = announced {
            // the registry already moved the entity, take that back
            if old_owner != new_owner {
                self.registry.set_owner(entity, old_owner);
            }
            return Err(error.into());
        }

        if let Some(replica) = self.world.get_mut(&entity) {
            replica.set_owner(new_owner);
        }
        info!("{} hands {} over to {} at {}", old_owner, entity, new_owner, at_version);
        if old_owner != new_owner {
            self.events.push_ownership_change(entity, new_owner);
        }
        Ok(())
    }

    fn adopt_owner(&mut self, entity: EntityId, new_owner: PeerId) {
        let previous = self.registry.set_owner(entity, new_owner);
        if let Some(replica) = self.world.get_mut(&entity) {
            replica.set_owner(new_owner);
        }
        if previous == Some(new_owner) {
            return;
        }
        self.events.push_ownership_change(entity, new_owner);
        for (request_id, outcome) in self.coordinator.cancel_forwarded(&entity) {
            self.events.push_outcome(request_id, entity, outcome);
        }
    }

    fn process_departure(&mut self, peer: PeerId, now: &Instant) -> Result<(), PeerError> {
        let master_change = self.membership.on_peer_departed(peer)?;
        self.departed.insert(peer);
        self.channel.remove_peer(peer);
        self.events.push_departure(peer);
        if let Some(master) = master_change {
            self.events.push_master_change(master);
        }

        let master = self.membership.current_master();
        let pending_transfers: Vec<(EntityId, PeerId)> = self
            .registry
            .owned_by(&peer)
            .into_iter()
            .filter_map(|entity| {
                self.registry
                    .pending_transfer(&entity)
                    .map(|target| (entity, target))
            })
            .collect();
        let reassigned = self.registry.reassign_all(peer, master);
        for entity in &reassigned {
            if let Some(replica) = self.world.get_mut(entity) {
                replica.set_owner(master);
            }
            self.events.push_ownership_change(*entity, master);
            for (request_id, outcome) in self.coordinator.cancel_forwarded(entity) {
                self.events.push_outcome(request_id, *entity, outcome);
            }
        }

        if !self.membership.is_master() {
            for entity in &reassigned {
                self.registry.begin_handoff(*entity);
            }
            self.handoffs.insert(peer, reassigned);
            return Ok(());
        }

        // the master waits on nobody
        for entities in mem::take(&mut self.handoffs).into_values() {
            for entity in entities {
                if self.registry.end_handoff(&entity) {
                    self.drain_queued(&entity, now);
                }
            }
        }

        let snapshots: Vec<EntitySnapshot> = reassigned
            .iter()
            .filter_map(|entity| self.world.get(entity).map(ReplicatedEntity::snapshot))
            .collect();
        info!(
            "{} takes over {} entities of departed {}",
            master,
            snapshots.len(),
            peer
        );
        self.channel.send(
            Targets::AllExceptSender,
            NetMessage::MasterReassigned {
                new_master: master,
                departed: peer,
                reassigned: snapshots,
            },
        )?;

        for entity in &reassigned {
            self.drain_queued(entity, now);
        }
        for (entity, target) in pending_transfers {
            let target = self.surviving_or_master(target);
            if target != master {
                self.transfer_ownership(&entity, target)?;
            }
        }
        Ok(())
    }

    fn on_master_reassigned(
        &mut self,
        new_master: PeerId,
        departed: PeerId,
        reassigned: Vec<EntitySnapshot>,
        now: &Instant,
    ) -> Result<(), PeerError> {
        if !self.departed.contains(&departed) && self.membership.contains(&departed) {
            self.process_departure(departed, now)?;
        }
        if self.membership.current_master() != new_master {
            warn!(
                "Peer Error: {} announced itself master, but {} is expected",
                new_master,
                self.membership.current_master()
            );
        }

        for snapshot in reassigned {
            let entity = snapshot.entity;
            if self.world.contains(&entity) {
                if let Some(replica) = self.world.get_mut(&entity) {
                    replica.load_snapshot(&snapshot, true);
                }
                self.adopt_owner(entity, new_master);
                self.events.push_update(entity, snapshot.version);
            } else if self.world.was_despawned(&entity) {
                continue;
            } else {
                let mut snapshot = snapshot;
                snapshot.owner = new_master;
                self.adopt_spawn(snapshot, now)?;
            }
            self.registry.end_handoff(&entity);
            self.drain_queued(&entity, now);
        }

        if let Some(entities) = self.handoffs.remove(&departed) {
            for entity in entities {
                if self.registry.end_handoff(&entity) {
                    self.drain_queued(&entity, now);
                }
            }
        }
        Ok(())
    }

    fn adopt_spawn(&mut self, snapshot: EntitySnapshot, now: &Instant) -> Result<(), PeerError> {
        let entity = snapshot.entity;
        if self.world.contains(&entity) || self.world.was_despawned(&entity) {
            debug!("{} is already known, ignoring spawn", entity);
            return Ok(());
        }
        let owner = self.surviving_or_master(snapshot.owner);
        let mut replica = ReplicatedEntity::from_snapshot(snapshot);
        replica.set_owner(owner);
        self.world.insert(replica)?;
        if let Err(error) = self.registry.register(entity, owner) {
            self.world.discard(&entity);
            return Err(error.into());
        }
        debug!("{} spawned {} owned by {}", self.local(), entity, owner);
        self.events.push_spawn(entity);

        for (from, message) in self.waitlist.take(&entity) {
            self.handle(from, message, now);
        }
        Ok(())
    }

    fn on_snapshot(
        &mut self,
        from: PeerId,
        snapshot: EntitySnapshot,
        now: &Instant,
    ) -> Result<(), PeerError> {
        let entity = snapshot.entity;
        if !self.world.contains(&entity) {
            return self.adopt_spawn(snapshot, now);
        }
        let owner = self.registry.owner_of(&entity)?;
        let Some(replica) = self.world.get_mut(&entity) else {
            return Ok(());
        };
        if replica.load_snapshot(&snapshot, false) {
            info!("{} resynced to {} from {}", entity, snapshot.version, from);
            self.events.push_update(entity, snapshot.version);
            self.drain_queued(&entity, now);
        } else if replica.awaiting_resync() {
            let source = if owner == self.membership.local() { from } else { owner };
            self.channel
                .send(Targets::Single(source), NetMessage::ResyncRequest { entity })?;
        }
        Ok(())
    }

    fn remove_entity(&mut self, entity: &EntityId) {
        if self.world.remove(entity).is_none() {
            return;
        }
        let dropped = self.registry.deregister(entity);
        if dropped > 0 {
            debug!("discarding {} queued messages for despawned {}", dropped, entity);
        }
        for (request_id, outcome) in self.coordinator.cancel_all(entity) {
            self.events.push_outcome(request_id, *entity, outcome);
        }
        info!("{} despawned {}", self.local(), entity);
        self.events.push_despawn(*entity);
    }

    fn drain_queued(&mut self, entity: &EntityId, now: &Instant) {
        for (from, message) in self.registry.take_queued(entity) {
            self.handle(from, message, now);
        }
    }

    fn surviving_or_master(&self, peer: PeerId) -> PeerId {
        if self.membership.contains(&peer) {
            peer
        } else {
            self.membership.current_master()
        }
    }
}
