//! # Brawlsync Peer
//! A session participant that replicates owner-authoritative entity state.
//!
//! Every entity has exactly one owner. Mutations requested anywhere are
//! routed to that owner, applied there once, and broadcast to the others as
//! the new authoritative payload. The owner of a departed peer's entities is
//! the session master.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use brawlsync_shared as shared;

mod channel;
mod config;
mod coordinator;
mod entity;
mod error;
mod events;
mod membership;
mod ownership;
mod peer;
mod waitlist;
mod world;

pub use channel::{Arrival, CommandChannel, OrderedReceiver, ReliableSender, Targets, Transport};
pub use config::{AuthorityConfig, ChannelConfig, PeerConfig};
pub use coordinator::{AuthorityCoordinator, RequestState, Route, TimeoutAction};
pub use entity::{Applied, RemoteApply, ReplicatedEntity};
pub use error::{ChannelError, PeerError, TransportError};
pub use events::{MutationOutcome, PeerEvents};
pub use membership::{SessionInfo, SessionMembership};
pub use ownership::{OwnershipRegistry, TransferPlan};
pub use peer::Peer;
pub use waitlist::{EntityWaitlist, WaitlistHandle};
pub use world::EntityWorld;
