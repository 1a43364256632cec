use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use log::{info, warn};

use brawlsync_shared::{EntityId, NetMessage, PeerId};

pub type WaitlistHandle = u32;

/// Holds messages that name an entity this peer has not spawned yet
///
/// A message is released once the entity arrives, in the order the messages
/// were parked. Messages still waiting after the configured time to live are
/// discarded.
pub struct EntityWaitlist {
    next_handle: WaitlistHandle,
    waiting_entity_to_handles: HashMap<EntityId, Vec<WaitlistHandle>>,
    items: HashMap<WaitlistHandle, (EntityId, PeerId, NetMessage)>,
    handle_ttls: VecDeque<(Instant, WaitlistHandle)>,
    handle_ttl: Duration,
}

impl EntityWaitlist {
    pub fn new(handle_ttl: Duration) -> Self {
        Self {
            next_handle: 0,
            waiting_entity_to_handles: HashMap::new(),
            items: HashMap::new(),
            handle_ttls: VecDeque::new(),
            handle_ttl,
        }
    }

    pub fn park(
        &mut self,
        now: &Instant,
        entity: EntityId,
        from: PeerId,
        message: NetMessage,
    ) -> WaitlistHandle {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1);

        info!(
            "parking {} from {} until {} is spawned",
            message.name(),
            from,
            entity
        );
        self.waiting_entity_to_handles
            .entry(entity)
            .or_default()
            .push(handle);
        self.items.insert(handle, (entity, from, message));
        self.handle_ttls.push_back((*now, handle));

        handle
    }

    /// Removes and returns everything waiting on `entity`, oldest first.
    pub fn take(&mut self, entity: &EntityId) -> Vec<(PeerId, NetMessage)> {
        let Some(handles) = self.waiting_entity_to_handles.remove(entity) else {
            return Vec::new();
        };
        let mut ready = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some((_, from, message)) = self.items.remove(&handle) {
                ready.push((from, message));
            }
            if let Some(ttl_index) = self
                .handle_ttls
                .iter()
                .position(|(_, ttl_handle)| *ttl_handle == handle)
            {
                self.handle_ttls.remove(ttl_index);
            }
        }
        ready
    }

    /// Drops every parked message older than the time to live. Returns how
    /// many were dropped.
    pub fn expire(&mut self, now: &Instant) -> usize {
        let mut expired = 0;
        loop {
            let Some((parked_at, _)) = self.handle_ttls.front() else {
                break;
            };
            if now.saturating_duration_since(*parked_at) < self.handle_ttl {
                break;
            }
            let Some((_, handle)) = self.handle_ttls.pop_front() else {
                break;
            };
            let Some((entity, from, message)) = self.items.remove(&handle) else {
                continue;
            };
            warn!(
                "Peer Error: {} from {} waited too long for {}, discarding",
                message.name(),
                from,
                entity
            );
            expired += 1;

            let mut remove = false;
            if let Some(handles) = self.waiting_entity_to_handles.get_mut(&entity) {
                handles.retain(|waiting| *waiting != handle);
                remove = handles.is_empty();
            }
            if remove {
                self.waiting_entity_to_handles.remove(&entity);
            }
        }
        expired
    }

    pub fn is_waiting_on(&self, entity: &EntityId) -> bool {
        self.waiting_entity_to_handles.contains_key(entity)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
