use std::{default::Default, time::Duration};

use serde::Deserialize;

use brawlsync_shared::DEFAULT_MAX_PACKET_SIZE;

/// Contains Config properties which will be used by a Peer
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Used to configure the reliable command channel to every other peer
    pub channel: ChannelConfig,
    /// Used to configure how forwarded mutation requests are awaited
    pub authority: AuthorityConfig,
    /// Number of applied request ids remembered per origin peer and entity,
    /// used to drop duplicate deliveries
    pub ledger_window: usize,
    /// How long a message naming a not-yet-spawned entity is held before it
    /// is discarded
    pub waitlist_ttl: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            authority: AuthorityConfig::default(),
            ledger_window: 64,
            waitlist_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Time to wait for an acknowledgement before a packet is sent again
    pub resend_interval: Duration,
    /// Upper bound of the random delay added to each resend, so peers that
    /// lost the same burst do not resend in lockstep
    pub resend_jitter: Duration,
    /// Packets larger than this are refused by the codec
    pub max_packet_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_millis(100),
            resend_jitter: Duration::from_millis(20),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// How long a forwarded request may wait for the owner's broadcast
    pub confirm_timeout: Duration,
    /// Total sends of a forwarded request (first send plus resubmissions)
    /// before it is given up and applied speculatively
    pub max_attempts: u8,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_millis(500),
            max_attempts: 2,
        }
    }
}
