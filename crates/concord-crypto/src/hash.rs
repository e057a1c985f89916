use concord_core::MemberId;

/// BLAKE3 hash of arbitrary bytes, as a 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive a `MemberId` from raw public key bytes.
///
/// Used only by this crate's own `KeyPair::generate`; in general a member's
/// id is assigned by the Identity collaborator and need not be derived from
/// key material at all.
pub fn member_id_from_pubkey(pubkey_bytes: &[u8]) -> MemberId {
    MemberId::from_bytes(blake3_hash(pubkey_bytes))
}
