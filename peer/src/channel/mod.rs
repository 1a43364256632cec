//! Reliable, per-sender ordered delivery of [`NetMessage`]s
//!
//! The command channel keeps one [`ReliableSender`] per remote peer and one
//! [`OrderedReceiver`] per remote peer. Messages from peer A reach peer B in
//! the order A sent them, exactly once, as long as both stay in the session;
//! nothing is promised about the interleaving of different senders.
//! Delivery to a peer that leaves is abandoned without error.

mod ordered_receiver;
mod reliable_sender;
mod transport;

use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    time::{Duration, Instant},
};

use log::{debug, trace, warn};

use brawlsync_shared::{decode_packet, encode_packet, MessageIndex, NetMessage, Packet, PeerId};

use crate::{config::ChannelConfig, error::ChannelError};
pub use ordered_receiver::{Arrival, OrderedReceiver};
pub use reliable_sender::ReliableSender;
pub use transport::Transport;

/// Who a message is addressed to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Targets {
    /// Every peer, the sender included
    All,
    /// Every peer except the sender
    AllExceptSender,
    Single(PeerId),
}

pub struct CommandChannel<T: Transport> {
    local: PeerId,
    transport: T,
    config: ChannelConfig,
    senders: HashMap<PeerId, ReliableSender>,
    receivers: HashMap<PeerId, OrderedReceiver>,
    departed: HashSet<PeerId>,
    loopback: VecDeque<NetMessage>,
    pending_acks: BTreeSet<PeerId>,
    rng: fastrand::Rng,
}

impl<T: Transport> CommandChannel<T> {
    pub fn new(
        local: PeerId,
        remote_peers: impl IntoIterator<Item = PeerId>,
        transport: T,
        config: ChannelConfig,
    ) -> Self {
        let mut channel = Self {
            local,
            transport,
            config,
            senders: HashMap::new(),
            receivers: HashMap::new(),
            departed: HashSet::new(),
            loopback: VecDeque::new(),
            pending_acks: BTreeSet::new(),
            rng: fastrand::Rng::with_seed(u64::from(local.0)),
        };
        for peer in remote_peers {
            channel.add_peer(peer);
        }
        channel
    }

    pub fn add_peer(&mut self, peer: PeerId) {
        if peer == self.local {
            return;
        }
        self.departed.remove(&peer);
        self.senders.entry(peer).or_insert_with(ReliableSender::new);
        self.receivers.entry(peer).or_insert_with(OrderedReceiver::new);
    }

    /// Abandons everything still in flight to or from `peer`.
    pub fn remove_peer(&mut self, peer: PeerId) {
        if let Some(sender) = self.senders.remove(&peer) {
            if sender.unacked_len() > 0 {
                debug!(
                    "abandoning {} unacknowledged packets to departed {}",
                    sender.unacked_len(),
                    peer
                );
            }
        }
        self.receivers.remove(&peer);
        self.pending_acks.remove(&peer);
        self.departed.insert(peer);
    }

    /// Queues `message` for `targets`.
    ///
    /// Fails without queueing anything if the message could never fit in a
    /// packet, since a hole in the index sequence would stall the receiver.
    pub fn send(&mut self, targets: Targets, message: NetMessage) -> Result<(), ChannelError> {
        let probe = Packet::Data {
            index: MessageIndex::MAX,
            message: message.clone(),
        };
        encode_packet(&probe, self.config.max_packet_size)?;

        match targets {
            Targets::All => {
                self.loopback.push_back(message.clone());
                self.queue_remote(message);
            }
            Targets::AllExceptSender => self.queue_remote(message),
            Targets::Single(peer) => {
                if peer == self.local {
                    self.loopback.push_back(message);
                } else if let Some(sender) = self.senders.get_mut(&peer) {
                    trace!("queueing {} for {}", message.name(), peer);
                    sender.queue(message);
                } else {
                    debug!("dropping {} for absent {}", message.name(), peer);
                }
            }
        }
        Ok(())
    }

    fn queue_remote(&mut self, message: NetMessage) {
        let mut peers: Vec<PeerId> = self.senders.keys().copied().collect();
        peers.sort();
        for peer in peers {
            if let Some(sender) = self.senders.get_mut(&peer) {
                sender.queue(message.clone());
            }
        }
    }

    /// Drains the loopback queue and the transport, returning messages in
    /// per-sender order.
    ///
    /// Malformed packets are logged and skipped; only a failing transport is
    /// reported as an error.
    pub fn receive(&mut self) -> Result<Vec<(PeerId, NetMessage)>, ChannelError> {
        let mut output: Vec<(PeerId, NetMessage)> = self
            .loopback
            .drain(..)
            .map(|message| (self.local, message))
            .collect();

        while let Some((from, bytes)) = self.transport.receive()? {
            if self.departed.contains(&from) {
                trace!("ignoring packet from departed {}", from);
                continue;
            }
            let packet = match decode_packet(&bytes, self.config.max_packet_size) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!("Peer Error: cannot read malformed packet from {}: {}", from, err);
                    continue;
                }
            };
            match packet {
                Packet::Ack { through } => {
                    if let Some(sender) = self.senders.get_mut(&from) {
                        let released = sender.ack(through);
                        trace!("{} acknowledged {} packets", from, released);
                    }
                }
                Packet::Data { index, message } => {
                    let receiver = self
                        .receivers
                        .entry(from)
                        .or_insert_with(OrderedReceiver::new);
                    self.pending_acks.insert(from);
                    match receiver.receive(index, message) {
                        Arrival::Duplicate => {
                            trace!("dropping duplicate packet {} from {}", index, from);
                        }
                        Arrival::Released(messages) => {
                            output.extend(messages.into_iter().map(|message| (from, message)));
                        }
                    }
                }
            }
        }

        Ok(output)
    }

    /// Sends acknowledgements and every packet that is due.
    ///
    /// A send the transport refuses stays queued and is retried after the
    /// resend interval.
    pub fn flush(&mut self, now: &Instant) -> Result<(), ChannelError> {
        let acks: Vec<PeerId> = std::mem::take(&mut self.pending_acks).into_iter().collect();
        for peer in acks {
            let Some(receiver) = self.receivers.get(&peer) else {
                continue;
            };
            let packet = Packet::Ack {
                through: receiver.delivered_through(),
            };
            self.transmit(peer, &packet)?;
        }

        let mut peers: Vec<PeerId> = self.senders.keys().copied().collect();
        peers.sort();
        for peer in peers {
            let interval = self.config.resend_interval;
            let jitter_ms = self.config.resend_jitter.as_millis() as u64;
            let rng = &self.rng;
            let Some(sender) = self.senders.get_mut(&peer) else {
                continue;
            };
            let due = sender.take_due(now, || {
                let jitter = if jitter_ms == 0 {
                    0
                } else {
                    rng.u64(0..=jitter_ms)
                };
                *now + interval + Duration::from_millis(jitter)
            });
            for (index, message) in due {
                self.transmit(peer, &Packet::Data { index, message })?;
            }
        }
        Ok(())
    }

    fn transmit(&mut self, peer: PeerId, packet: &Packet) -> Result<(), ChannelError> {
        let bytes = encode_packet(packet, self.config.max_packet_size)?;
        if let Err(err) = self.transport.send(peer, &bytes) {
            warn!("Peer Error: cannot send packet to {}: {}", peer, err);
        }
        Ok(())
    }

    pub fn unacked_len(&self, peer: &PeerId) -> usize {
        self.senders
            .get(peer)
            .map(ReliableSender::unacked_len)
            .unwrap_or(0)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
