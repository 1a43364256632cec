use std::collections::BTreeSet;

use log::info;

use brawlsync_shared::{PeerId, ReplicationError};

/// What the presence service reports when a peer enters a session
#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub local: PeerId,
    /// Every peer currently in the session, the local one included
    pub peers: Vec<PeerId>,
    pub master: PeerId,
}

impl SessionInfo {
    /// A session with only the local peer, which is also its master.
    pub fn solo(local: PeerId) -> Self {
        Self {
            local,
            peers: vec![local],
            master: local,
        }
    }
}

/// Who is in the session and who is master
///
/// The master stays the same across joins. When it leaves, the lowest
/// surviving id takes over; every peer computes this on its own and gets the
/// same answer.
pub struct SessionMembership {
    local: PeerId,
    peers: BTreeSet<PeerId>,
    master: PeerId,
}

impl SessionMembership {
    pub fn new(info: SessionInfo) -> Result<Self, ReplicationError> {
        let mut peers: BTreeSet<PeerId> = info.peers.into_iter().collect();
        peers.insert(info.local);
        if !peers.contains(&info.master) {
            return Err(ReplicationError::UnknownPeer { peer: info.master });
        }
        Ok(Self {
            local: info.local,
            peers,
            master: info.master,
        })
    }

    pub fn local(&self) -> PeerId {
        self.local
    }

    pub fn current_master(&self) -> PeerId {
        self.master
    }

    pub fn is_master(&self) -> bool {
        self.master == self.local
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.iter().copied()
    }

    pub fn remote_peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.iter().copied().filter(move |peer| *peer != self.local)
    }

    /// Returns `false` if the peer was already a member.
    pub fn on_peer_joined(&mut self, peer: PeerId) -> bool {
        let added = self.peers.insert(peer);
        if added {
            info!("{} joined the session", peer);
        }
        added
    }

    /// Removes `peer` and returns the new master if the departure changed it.
    pub fn on_peer_departed(&mut self, peer: PeerId) -> Result<Option<PeerId>, ReplicationError> {
        if peer == self.local || !self.peers.remove(&peer) {
            return Err(ReplicationError::UnknownPeer { peer });
        }
        info!("{} left the session", peer);
        if peer != self.master {
            return Ok(None);
        }
        let Some(next) = self.peers.iter().next().copied() else {
            return Err(ReplicationError::UnknownPeer { peer: self.local });
        };
        info!("{} is the new master after {} left", next, peer);
        self.master = next;
        Ok(Some(next))
    }
}
