use std::{collections::VecDeque, time::Instant};

use brawlsync_shared::{MessageIndex, NetMessage};

struct OutgoingPacket {
    index: MessageIndex,
    message: NetMessage,
    next_send: Option<Instant>,
}

/// Outgoing half of the reliable channel towards one peer
///
/// Every message gets the next `MessageIndex` and stays queued until the
/// receiver acknowledges it, being sent again each time its resend deadline
/// passes.
pub struct ReliableSender {
    next_index: MessageIndex,
    unacked: VecDeque<OutgoingPacket>,
}

impl ReliableSender {
    pub fn new() -> Self {
        Self {
            next_index: 1,
            unacked: VecDeque::new(),
        }
    }

    pub fn queue(&mut self, message: NetMessage) -> MessageIndex {
        let index = self.next_index;
        self.next_index += 1;
        self.unacked.push_back(OutgoingPacket {
            index,
            message,
            next_send: None,
        });
        index
    }

    /// Collects every packet that was never sent or whose resend deadline has
    /// passed, scheduling its next resend with `resend_at`.
    pub fn take_due(
        &mut self,
        now: &Instant,
        mut resend_at: impl FnMut() -> Instant,
    ) -> Vec<(MessageIndex, NetMessage)> {
        let mut output = Vec::new();
        for packet in self.unacked.iter_mut() {
            let due = match packet.next_send {
                None => true,
                Some(deadline) => deadline <= *now,
            };
            if due {
                packet.next_send = Some(resend_at());
                output.push((packet.index, packet.message.clone()));
            }
        }
        output
    }

    /// Drops every packet up to and including `through`, returns how many.
    pub fn ack(&mut self, through: MessageIndex) -> usize {
        let mut removed = 0;
        while let Some(packet) = self.unacked.front() {
            if packet.index > through {
                break;
            }
            self.unacked.pop_front();
            removed += 1;
        }
        removed
    }

    pub fn unacked_len(&self) -> usize {
        self.unacked.len()
    }
}
