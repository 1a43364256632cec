
pub use scripted_peer::ScriptedPeer;
pub use test_session::{TestSession, TICK};
