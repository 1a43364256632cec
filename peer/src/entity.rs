use log::{debug, trace, warn};

use brawlsync_shared::{
    EntityId, EntityLifecycleEvent, EntitySnapshot, Mutation, MutationError, Payload, PeerId,
    ReplicationError, RequestLedger, RequestOrigin, Version,
};

/// Result of an accepted mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub version: Version,
    pub events: Vec<EntityLifecycleEvent>,
}

/// What happened to a broadcast handed to [`ReplicatedEntity::apply_remote`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteApply {
    Applied(Applied),
    /// The broadcast is at or below the current version
    Stale,
    /// The entity is waiting for a snapshot and ignores broadcasts meanwhile
    Ignored,
}

/// One replicated entity as seen by this peer
#[derive(Clone, Debug)]
pub struct ReplicatedEntity {
    id: EntityId,
    owner: PeerId,
    version: Version,
    payload: Payload,
    ledger: RequestLedger,
    speculative: Option<Payload>,
    awaiting_resync: bool,
}

impl ReplicatedEntity {
    pub fn new(id: EntityId, owner: PeerId, payload: Payload) -> Self {
        Self {
            id,
            owner,
            version: Version::default(),
            payload,
            ledger: RequestLedger::new(),
            speculative: None,
            awaiting_resync: false,
        }
    }

    pub fn from_snapshot(snapshot: EntitySnapshot) -> Self {
        Self {
            id: snapshot.entity,
            owner: snapshot.owner,
            version: snapshot.version,
            payload: snapshot.payload,
            ledger: snapshot.ledger,
            speculative: None,
            awaiting_resync: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn owner(&self) -> PeerId {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: PeerId) {
        self.owner = owner;
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The authoritative payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// What the local game should show: the speculative payload while one
    /// exists, the authoritative one otherwise.
    pub fn view(&self) -> &Payload {
        self.speculative.as_ref().unwrap_or(&self.payload)
    }

    pub fn is_speculative(&self) -> bool {
        self.speculative.is_some()
    }

    pub fn awaiting_resync(&self) -> bool {
        self.awaiting_resync
    }

    pub(crate) fn mark_awaiting_resync(&mut self) {
        self.awaiting_resync = true;
    }

    pub fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    /// Applies a mutation as the owner.
    ///
    /// The ledger is checked before anything changes, so a request that
    /// reaches the owner twice is applied once.
    pub fn apply_local(
        &mut self,
        local: PeerId,
        origin: RequestOrigin,
        mutation: &Mutation,
        ledger_window: usize,
    ) -> Result<Applied, ReplicationError> {
        if self.owner != local {
            return Err(ReplicationError::NotOwner {
                entity: self.id,
                owner: self.owner,
                operation: "apply_local",
            });
        }
        if self.ledger.contains(&origin) {
            return Err(ReplicationError::Duplicate {
                entity: self.id,
                origin,
            });
        }

        let previous = self.payload.clone();
        self.payload
            .apply(mutation)
            .map_err(|reason| ReplicationError::Rejected {
                entity: self.id,
                reason,
            })?;
        self.ledger.record(origin, ledger_window);
        self.version = self.version.next();
        self.speculative = None;

        trace!(
            "{} applied {} from {} at {}",
            self.id,
            mutation.name(),
            origin.peer,
            self.version
        );
        Ok(Applied {
            version: self.version,
            events: self.payload.transitions(&previous),
        })
    }

    /// Applies the owner's broadcast.
    ///
    /// Only `version + 1` is accepted. Anything at or below the current
    /// version is a late duplicate; anything beyond leaves a hole, and the
    /// entity stops taking broadcasts until a snapshot fills it.
    pub fn apply_remote(
        &mut self,
        new_version: Version,
        payload: Payload,
        cause: Option<RequestOrigin>,
        ledger_window: usize,
    ) -> Result<RemoteApply, ReplicationError> {
        if self.awaiting_resync {
            trace!("{} ignores {} while awaiting resync", self.id, new_version);
            return Ok(RemoteApply::Ignored);
        }
        if new_version <= self.version {
            debug!(
                "{} drops stale broadcast {} (at {})",
                self.id, new_version, self.version
            );
            return Ok(RemoteApply::Stale);
        }
        let expected = self.version.next();
        if new_version != expected {
            warn!(
                "Peer Error: {} expected {} but received {}",
                self.id, expected, new_version
            );
            self.awaiting_resync = true;
            return Err(ReplicationError::OutOfSync {
                entity: self.id,
                expected,
                actual: new_version,
            });
        }

        let events = payload.transitions(&self.payload);
        self.payload = payload;
        self.version = new_version;
        self.speculative = None;
        if let Some(origin) = cause {
            self.ledger.record(origin, ledger_window);
        }
        Ok(RemoteApply::Applied(Applied {
            version: new_version,
            events,
        }))
    }

    /// Adopts a full snapshot. Unless `force` is set, a snapshot older than
    /// the current version is refused. Returns whether it was loaded.
    ///
    /// Ownership is not taken from the snapshot; it only changes through
    /// transfers and master handoff.
    pub fn load_snapshot(&mut self, snapshot: &EntitySnapshot, force: bool) -> bool {
        if !force && snapshot.version < self.version {
            debug!(
                "{} refuses snapshot at {} (at {})",
                self.id, snapshot.version, self.version
            );
            return false;
        }
        self.version = snapshot.version;
        self.payload = snapshot.payload.clone();
        self.ledger = snapshot.ledger.clone();
        self.speculative = None;
        self.awaiting_resync = false;
        true
    }

    /// Applies `mutation` to the local view only. The authoritative payload
    /// and version are untouched, and the next broadcast or snapshot
    /// discards the result.
    pub fn apply_speculative(&mut self, mutation: &Mutation) -> Result<(), MutationError> {
        let mut view = self.view().clone();
        view.apply(mutation)?;
        self.speculative = Some(view);
        Ok(())
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity: self.id,
            owner: self.owner,
            version: self.version,
            payload: self.payload.clone(),
            ledger: self.ledger.clone(),
        }
    }
}
