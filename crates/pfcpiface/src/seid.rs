//! SEID pairing.
//!
//! The local SEID of a session is derived from the peer's SEID by a fixed
//! 64-bit rotation, so a reply address can be recovered from the local SEID
//! alone. Rotation is a bijection over the whole `u64` space: two distinct
//! peer SEIDs never collide on one local SEID.

const PAIRING_SHIFT: u32 = 2;

/// Local SEID for a peer-assigned SEID.
pub fn local_seid(peer: u64) -> u64 {
    peer.rotate_left(PAIRING_SHIFT)
}

/// Peer SEID for a locally-assigned SEID. Inverse of [`local_seid`].
pub fn peer_seid(local: u64) -> u64 {
    local.rotate_right(PAIRING_SHIFT)
}
