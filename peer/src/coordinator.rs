//! Tracks every mutation request this peer issued
//!
//! ```text
//! REQUESTED --owner is local--> APPLIED_LOCAL --> CONFIRMED
//!     |
//!     +--owner is remote--> FORWARDED --matching broadcast--> CONFIRMED
//!                               |
//!                               +--timeout--> resubmit once --timeout--> SPECULATIVE
//! ```
//!
//! A request may also end REJECTED (the owner refused it) or CANCELLED (its
//! entity was despawned or changed owner while it was forwarded).

use std::{
    collections::{BTreeMap, HashMap},
    time::Instant,
};

use log::{debug, warn};

use brawlsync_shared::{
    EntityId, Mutation, MutationError, PeerId, ReplicationError, RequestId, Version,
};

use crate::{config::AuthorityConfig, events::MutationOutcome, ownership::OwnershipRegistry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    /// Waiting for a handoff or transfer before it can be routed
    Requested,
    AppliedLocal,
    Forwarded,
    Confirmed,
    Rejected,
    Speculative,
    Cancelled,
}

impl RequestState {
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            RequestState::Requested | RequestState::AppliedLocal | RequestState::Forwarded
        )
    }
}

/// Where a new request has to go
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    ApplyLocal,
    Forward { owner: PeerId },
    Queue,
}

/// What to do about a forwarded request that timed out
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeoutAction {
    Resubmit {
        request_id: RequestId,
        entity: EntityId,
        mutation: Mutation,
    },
    GiveUp {
        request_id: RequestId,
        entity: EntityId,
        owner: PeerId,
        mutation: Mutation,
    },
}

struct PendingRequest {
    entity: EntityId,
    mutation: Mutation,
    owner: Option<PeerId>,
    attempts: u8,
    deadline: Option<Instant>,
}

pub struct AuthorityCoordinator {
    config: AuthorityConfig,
    last_request_id: RequestId,
    pending: BTreeMap<RequestId, PendingRequest>,
    states: HashMap<RequestId, RequestState>,
}

impl AuthorityCoordinator {
    pub fn new(config: AuthorityConfig) -> Self {
        Self {
            config,
            last_request_id: RequestId(0),
            pending: BTreeMap::new(),
            states: HashMap::new(),
        }
    }

    pub fn next_request_id(&mut self) -> RequestId {
        self.last_request_id = self.last_request_id.next();
        self.last_request_id
    }

    pub fn route(
        &self,
        registry: &OwnershipRegistry,
        entity: &EntityId,
    ) -> Result<Route, ReplicationError> {
        let owner = registry.owner_of(entity)?;
        if registry.is_blocked(entity) {
            return Ok(Route::Queue);
        }
        if registry.is_owned_locally(entity) {
            return Ok(Route::ApplyLocal);
        }
        Ok(Route::Forward { owner })
    }

    pub fn state(&self, request_id: &RequestId) -> Option<RequestState> {
        self.states.get(request_id).copied()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn track_local(&mut self, request_id: RequestId) {
        self.states.insert(request_id, RequestState::AppliedLocal);
    }

    pub fn track_queued(&mut self, request_id: RequestId, entity: EntityId, mutation: Mutation) {
        self.pending.insert(
            request_id,
            PendingRequest {
                entity,
                mutation,
                owner: None,
                attempts: 0,
                deadline: None,
            },
        );
        self.states.insert(request_id, RequestState::Requested);
    }

    /// Starts the confirmation timer of a request sent to `owner`.
    pub fn track_forwarded(
        &mut self,
        request_id: RequestId,
        entity: EntityId,
        owner: PeerId,
        mutation: Mutation,
        now: &Instant,
    ) {
        let deadline = *now + self.config.confirm_timeout;
        let request = self.pending.entry(request_id).or_insert(PendingRequest {
            entity,
            mutation,
            owner: None,
            attempts: 0,
            deadline: None,
        });
        request.owner = Some(owner);
        request.attempts = 1;
        request.deadline = Some(deadline);
        self.states.insert(request_id, RequestState::Forwarded);
    }

    /// A request that was queued locally turned out to be ours to apply.
    pub fn promote_to_local(&mut self, request_id: &RequestId) {
        self.pending.remove(request_id);
        self.states.insert(*request_id, RequestState::AppliedLocal);
    }

    /// Resolves a request whose effect was broadcast by its entity's owner.
    /// Returns `None` if it already ended.
    pub fn confirm(&mut self, request_id: &RequestId, version: Version) -> Option<MutationOutcome> {
        let state = self.states.get(request_id).copied()?;
        if !state.is_pending() {
            return None;
        }
        self.pending.remove(request_id);
        self.states.insert(*request_id, RequestState::Confirmed);
        Some(MutationOutcome::Confirmed { version })
    }

    pub fn reject(
        &mut self,
        request_id: &RequestId,
        reason: MutationError,
    ) -> Option<MutationOutcome> {
        let state = self.states.get(request_id).copied()?;
        if !state.is_pending() {
            return None;
        }
        self.pending.remove(request_id);
        self.states.insert(*request_id, RequestState::Rejected);
        Some(MutationOutcome::Rejected { reason })
    }

    /// Cancels requests on `entity` that were already sent to its previous
    /// owner. Queued requests are kept; they are routed once the entity is
    /// unblocked.
    pub fn cancel_forwarded(&mut self, entity: &EntityId) -> Vec<(RequestId, MutationOutcome)> {
        self.cancel_where(entity, |request| request.owner.is_some())
    }

    /// Cancels every pending request on `entity`.
    pub fn cancel_all(&mut self, entity: &EntityId) -> Vec<(RequestId, MutationOutcome)> {
        self.cancel_where(entity, |_| true)
    }

    fn cancel_where(
        &mut self,
        entity: &EntityId,
        predicate: impl Fn(&PendingRequest) -> bool,
    ) -> Vec<(RequestId, MutationOutcome)> {
        let cancelled: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, request)| request.entity == *entity && predicate(request))
            .map(|(request_id, _)| *request_id)
            .collect();

        let mut outcomes = Vec::with_capacity(cancelled.len());
        for request_id in cancelled {
            self.pending.remove(&request_id);
            self.states.insert(request_id, RequestState::Cancelled);
            debug!("cancelled request {:?} on {}", request_id, entity);
            outcomes.push((
                request_id,
                MutationOutcome::Cancelled {
                    error: ReplicationError::Cancelled {
                        entity: *entity,
                        request_id,
                    },
                },
            ));
        }
        outcomes
    }

    /// Collects forwarded requests whose owner has not answered in time, in
    /// request order.
    ///
    /// A request is resubmitted until it has been sent `max_attempts` times;
    /// after that it is given up and marked speculative.
    pub fn poll_timeouts(&mut self, now: &Instant) -> Vec<TimeoutAction> {
        let mut actions = Vec::new();
        let mut given_up = Vec::new();

        for (request_id, request) in self.pending.iter_mut() {
            let (Some(deadline), Some(owner)) = (request.deadline, request.owner) else {
                continue;
            };
            if *now < deadline {
                continue;
            }
            if request.attempts < self.config.max_attempts {
                request.attempts += 1;
                request.deadline = Some(*now + self.config.confirm_timeout);
                debug!(
                    "resubmitting request {:?} on {} (attempt {})",
                    request_id, request.entity, request.attempts
                );
                actions.push(TimeoutAction::Resubmit {
                    request_id: *request_id,
                    entity: request.entity,
                    mutation: request.mutation.clone(),
                });
            } else {
                warn!(
                    "Peer Error: {} never confirmed request {:?} on {}",
                    owner, request_id, request.entity
                );
                given_up.push(*request_id);
                actions.push(TimeoutAction::GiveUp {
                    request_id: *request_id,
                    entity: request.entity,
                    owner,
                    mutation: request.mutation.clone(),
                });
            }
        }

        for request_id in given_up {
            self.pending.remove(&request_id);
            self.states.insert(request_id, RequestState::Speculative);
        }
        actions
    }

    /// Records the owner a resubmitted request was sent to.
    pub fn retarget(&mut self, request_id: &RequestId, owner: PeerId) {
        if let Some(request) = self.pending.get_mut(request_id) {
            request.owner = Some(owner);
        }
    }
}
