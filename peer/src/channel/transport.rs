use brawlsync_shared::PeerId;

use crate::error::TransportError;

/// Raw datagram substrate under the command channel
///
/// Implementations may drop, duplicate or reorder payloads; the channel
/// layers reliability and per-sender ordering on top.
pub trait Transport {
    fn send(&mut self, to: PeerId, payload: &[u8]) -> Result<(), TransportError>;

    /// Returns the next payload that arrived, if any.
    fn receive(&mut self) -> Result<Option<(PeerId, Vec<u8>)>, TransportError>;
}
