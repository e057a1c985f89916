use serde::{Deserialize, Serialize};
use std::fmt;

// ── MemberId ─────────────────────────────────────────────────────────────────

/// 32-byte member identifier, opaque to the core beyond equality and ordering.
///
/// Assigned by the Identity collaborator; the core never derives it from key
/// material, since it never inspects key material (§4.2).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub [u8; 32]);

impl MemberId {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Reserved clearing-account identifier for a cell: all zero bytes except
    /// a leading marker byte, so it can never collide with a member id minted
    /// from real key material.
    pub fn clearing_account_for(cell: &CellId) -> Self {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xFF;
        bytes[1..9].copy_from_slice(&cell.0[..8]);
        Self(bytes)
    }

    pub fn to_b58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn from_b58(s: &str) -> Result<Self, bs58::decode::Error> {
        let bytes = bs58::decode(s).into_vec()?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes[..32]);
        Ok(Self(arr))
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_b58())
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({})", &self.to_b58()[..8.min(self.to_b58().len())])
    }
}

// ── CellId ───────────────────────────────────────────────────────────────────

/// 32-byte cell identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub [u8; 32]);

impl CellId {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_b58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn from_b58(s: &str) -> Result<Self, bs58::decode::Error> {
        let bytes = bs58::decode(s).into_vec()?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes[..32]);
        Ok(Self(arr))
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_b58())
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellId({})", &self.to_b58()[..8.min(self.to_b58().len())])
    }
}

macro_rules! id16 {
    ($name:ident, $prefix:literal) => {
        /// 16-byte identifier, unique per cell and suitable as an idempotency key.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            pub fn from_bytes(b: [u8; 16]) -> Self {
                Self(b)
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                let mut arr = [0u8; 16];
                arr.copy_from_slice(&bytes[..16]);
                Ok(Self(arr))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "({}…)"), &self.to_hex()[..12])
            }
        }
    };
}

id16!(TransactionId, "TransactionId");
id16!(CommitmentId, "CommitmentId");
id16!(FederationTxId, "FederationTxId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_id_b58_round_trips() {
        let id = MemberId::from_bytes([7u8; 32]);
        let s = id.to_b58();
        assert_eq!(MemberId::from_b58(&s).unwrap(), id);
    }

    #[test]
    fn clearing_account_differs_per_cell() {
        let a = CellId::from_bytes([1u8; 32]);
        let b = CellId::from_bytes([2u8; 32]);
        assert_ne!(
            MemberId::clearing_account_for(&a),
            MemberId::clearing_account_for(&b)
        );
    }

    #[test]
    fn transaction_id_hex_round_trips() {
        let id = TransactionId::from_bytes([9u8; 16]);
        let s = id.to_hex();
        assert_eq!(TransactionId::from_hex(&s).unwrap(), id);
    }
}
