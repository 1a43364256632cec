//! # Brawlsync Shared
//! Identifiers, replicated payloads, wire messages and the packet codec
//! shared by every brawlsync peer.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod codec;
mod error;
mod ledger;
mod messages;
mod payload;
mod types;

pub use codec::{decode_packet, encode_packet, DEFAULT_MAX_PACKET_SIZE};
pub use error::{CodecError, MutationError, ReplicationError};
pub use ledger::RequestLedger;
pub use messages::{EntitySnapshot, NetMessage, Packet};
pub use payload::{
    health::Health,
    lifecycle::{EntityLifecycleEvent, Lifecycle},
    loadout::{Degenerate, Loadout, Weapon},
    pickup::{Pickup, PickupItem},
    tactic::EnemyTactic,
    wave::{Wave, WaveProgress},
    Mutation, Payload,
};
pub use types::{EntityId, MessageIndex, PeerId, RequestId, RequestOrigin, Version};
