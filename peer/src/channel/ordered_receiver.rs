use std::collections::BTreeMap;

use brawlsync_shared::{MessageIndex, NetMessage};

/// Incoming half of the reliable channel from one peer
///
/// Packets may arrive in any order and more than once; messages are
/// released strictly in the sender's index order, each exactly once.
pub struct OrderedReceiver {
    delivered_through: MessageIndex,
    buffer: BTreeMap<MessageIndex, NetMessage>,
}

/// Result of buffering one incoming packet
#[derive(Debug, PartialEq, Eq)]
pub enum Arrival {
    /// Already delivered or already buffered
    Duplicate,
    /// Messages now deliverable, oldest first (possibly none)
    Released(Vec<NetMessage>),
}

impl OrderedReceiver {
    pub fn new() -> Self {
        Self {
            delivered_through: 0,
            buffer: BTreeMap::new(),
        }
    }

    pub fn receive(&mut self, index: MessageIndex, message: NetMessage) -> Arrival {
        if index <= self.delivered_through || self.buffer.contains_key(&index) {
            return Arrival::Duplicate;
        }
        self.buffer.insert(index, message);

        let mut output = Vec::new();
        while let Some(message) = self.buffer.remove(&(self.delivered_through + 1)) {
            output.push(message);
            self.delivered_through += 1;
        }
        Arrival::Released(output)
    }

    /// Highest index such that it and all before it were delivered.
    pub fn delivered_through(&self) -> MessageIndex {
        self.delivered_through
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
