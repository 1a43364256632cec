//! JSON encoding of channel packets
//!
//! Peers exchange [`Packet`]s as `serde_json` bytes. A maximum size guards
//! against unbounded allocation from corrupted or malicious input; snapshots
//! of wave progress are the largest expected packets.

use log::trace;

use crate::{error::CodecError, messages::Packet};

/// Default upper bound on the encoded size of a single packet (64 KiB).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 64 * 1024;

pub fn encode_packet(packet: &Packet, max_size: usize) -> Result<Vec<u8>, CodecError> {
    let bytes = serde_json::to_vec(packet).map_err(|err| CodecError::Encode {
        reason: err.to_string(),
    })?;
    if bytes.len() > max_size {
        return Err(CodecError::TooLarge {
            length: bytes.len(),
            max: max_size,
        });
    }
    trace!("encoded packet of {} bytes", bytes.len());
    Ok(bytes)
}

pub fn decode_packet(bytes: &[u8], max_size: usize) -> Result<Packet, CodecError> {
    if bytes.len() > max_size {
        return Err(CodecError::TooLarge {
            length: bytes.len(),
            max: max_size,
        });
    }
    serde_json::from_slice(bytes).map_err(|err| CodecError::Decode {
        reason: err.to_string(),
    })
}
