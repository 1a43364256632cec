/// In-memory datagram hub for multi-peer tests
/// Routes payloads between peers without network I/O, with optional loss,
/// duplication, reordering, holding and blocking of traffic
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use brawlsync_peer::{Transport, TransportError};
use brawlsync_shared::PeerId;

struct HubState {
    queues: HashMap<PeerId, VecDeque<(PeerId, Vec<u8>)>>,
    held: HashMap<(PeerId, PeerId), VecDeque<Vec<u8>>>,
    holding: HashSet<(PeerId, PeerId)>,
    blocked: HashSet<(PeerId, PeerId)>,
    disconnected: HashSet<PeerId>,
    drop_rate: f64,
    duplicate_rate: f64,
    reorder: bool,
    rng: fastrand::Rng,
    sent: usize,
}

impl HubState {
    fn deliver(&mut self, from: PeerId, to: PeerId, payload: Vec<u8>) {
        let reorder = self.reorder && self.rng.bool();
        let Some(queue) = self.queues.get_mut(&to) else {
            return;
        };
        if reorder && !queue.is_empty() {
            let position = self.rng.usize(0..=queue.len());
            queue.insert(position, (from, payload));
        } else {
            queue.push_back((from, payload));
        }
    }
}

/// Shared switchboard; every [`LocalTransport`] created from the same hub
/// can reach the others
#[derive(Clone)]
pub struct LocalHub {
    state: Arc<Mutex<HubState>>,
}

impl LocalHub {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                queues: HashMap::new(),
                held: HashMap::new(),
                holding: HashSet::new(),
                blocked: HashSet::new(),
                disconnected: HashSet::new(),
                drop_rate: 0.0,
                duplicate_rate: 0.0,
                reorder: false,
                rng: fastrand::Rng::with_seed(seed),
                sent: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches `peer` to the hub and returns its endpoint
    pub fn transport(&self, peer: PeerId) -> LocalTransport {
        let mut state = self.lock();
        state.disconnected.remove(&peer);
        state.queues.entry(peer).or_default();
        LocalTransport {
            peer,
            state: self.state.clone(),
        }
    }

    /// Probability in `0.0..=1.0` that a payload is lost
    pub fn set_drop_rate(&self, rate: f64) {
        self.lock().drop_rate = rate;
    }

    /// Probability in `0.0..=1.0` that a payload is delivered twice
    pub fn set_duplicate_rate(&self, rate: f64) {
        self.lock().duplicate_rate = rate;
    }

    pub fn set_reorder(&self, reorder: bool) {
        self.lock().reorder = reorder;
    }

    /// Turns every fault off
    pub fn heal(&self) {
        let mut state = self.lock();
        state.drop_rate = 0.0;
        state.duplicate_rate = 0.0;
        state.reorder = false;
    }

    /// Silently discards everything `from` sends to `to` until unblocked
    pub fn block(&self, from: PeerId, to: PeerId) {
        self.lock().blocked.insert((from, to));
    }

    pub fn unblock(&self, from: PeerId, to: PeerId) {
        self.lock().blocked.remove(&(from, to));
    }

    /// Keeps everything `from` sends to `to` aside until released
    pub fn hold(&self, from: PeerId, to: PeerId) {
        self.lock().holding.insert((from, to));
    }

    /// Delivers the held traffic from `from` to `to` in its original order
    pub fn release(&self, from: PeerId, to: PeerId) {
        let mut state = self.lock();
        state.holding.remove(&(from, to));
        let held = state.held.remove(&(from, to)).unwrap_or_default();
        if let Some(queue) = state.queues.get_mut(&to) {
            queue.extend(held.into_iter().map(|payload| (from, payload)));
        }
    }

    /// Removes `peer` from the hub, along with everything in flight to or
    /// from it
    pub fn disconnect(&self, peer: PeerId) {
        let mut state = self.lock();
        state.disconnected.insert(peer);
        state.queues.remove(&peer);
        for queue in state.queues.values_mut() {
            queue.retain(|(from, _)| *from != peer);
        }
        state
            .held
            .retain(|(from, to), _| *from != peer && *to != peer);
    }

    /// Payloads waiting in queues or held back
    pub fn in_flight(&self) -> usize {
        let state = self.lock();
        state.queues.values().map(VecDeque::len).sum::<usize>()
            + state.held.values().map(VecDeque::len).sum::<usize>()
    }

    /// Payloads handed to the hub so far, whether delivered or not
    pub fn sent_count(&self) -> usize {
        self.lock().sent
    }
}

/// One peer's endpoint on a [`LocalHub`]
pub struct LocalTransport {
    peer: PeerId,
    state: Arc<Mutex<HubState>>,
}

impl LocalTransport {
    pub fn peer(&self) -> PeerId {
        self.peer
    }
}

impl Transport for LocalTransport {
    fn send(&mut self, to: PeerId, payload: &[u8]) -> Result<(), TransportError> {
        let Ok(mut state) = self.state.lock() else {
            return Err(TransportError::Closed);
        };
        if state.disconnected.contains(&self.peer) {
            return Err(TransportError::Closed);
        }
        state.sent += 1;

        let link = (self.peer, to);
        if state.blocked.contains(&link) || state.disconnected.contains(&to) {
            return Ok(());
        }
        let drop_rate = state.drop_rate;
        if drop_rate > 0.0 && state.rng.f64() < drop_rate {
            return Ok(());
        }
        let duplicate_rate = state.duplicate_rate;
        let copies = if duplicate_rate > 0.0 && state.rng.f64() < duplicate_rate {
            2
        } else {
            1
        };

        for _ in 0..copies {
            if state.holding.contains(&link) {
                state
                    .held
                    .entry(link)
                    .or_default()
                    .push_back(payload.to_vec());
            } else {
                state.deliver(self.peer, to, payload.to_vec());
            }
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<(PeerId, Vec<u8>)>, TransportError> {
        let Ok(mut state) = self.state.lock() else {
            return Err(TransportError::Closed);
        };
        if state.disconnected.contains(&self.peer) {
            return Err(TransportError::Closed);
        }
        Ok(state
            .queues
            .get_mut(&self.peer)
            .and_then(VecDeque::pop_front))
    }
}
