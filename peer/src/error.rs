use thiserror::Error;

use brawlsync_shared::{CodecError, PeerId, ReplicationError};

/// Errors reported by a [`Transport`](crate::Transport) implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The substrate could not hand the payload to the destination
    #[error("Failed to send {length} bytes to {peer}")]
    SendFailed { peer: PeerId, length: usize },

    /// The substrate is shut down
    #[error("Transport is closed")]
    Closed,
}

/// Errors that can occur while moving packets over the command channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors surfaced by a Peer through its events
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
