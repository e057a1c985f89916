//! Sled-backed persistence for commitments.
//!
//! | Tree | Key | Value |
//! |---|---|---|
//! | `commitment` | `commitment_id` bytes (16) | bincode [`Commitment`] |

use std::path::Path;

use crate::error::CommitmentsError;
use crate::types::{Commitment, CommitmentId};

pub struct CommitmentDb {
    commitment: sled::Tree,
}

impl CommitmentDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CommitmentsError> {
        let db = sled::open(path).map_err(|e| CommitmentsError::Storage(e.to_string()))?;
        let commitment = db
            .open_tree("commitment")
            .map_err(|e| CommitmentsError::Storage(e.to_string()))?;
        Ok(Self { commitment })
    }

    pub fn get(&self, id: &CommitmentId) -> Result<Option<Commitment>, CommitmentsError> {
        let raw = self
            .commitment
            .get(id.as_bytes())
            .map_err(|e| CommitmentsError::Storage(e.to_string()))?;
        raw.map(|bytes| {
            bincode::deserialize(&bytes)
                .map_err(|e| CommitmentsError::Serialization(e.to_string()))
        })
        .transpose()
    }

    pub fn put(&self, commitment: &Commitment) -> Result<(), CommitmentsError> {
        let bytes = bincode::serialize(commitment)
            .map_err(|e| CommitmentsError::Serialization(e.to_string()))?;
        self.commitment
            .insert(commitment.id.as_bytes(), bytes)
            .map_err(|e| CommitmentsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All commitments; used by `active_commitment_count` lookups and the
    /// Hardening harness's solvency snapshots.
    pub fn iter(&self) -> Result<Vec<Commitment>, CommitmentsError> {
        let mut out = Vec::new();
        for kv in self.commitment.iter() {
            let (_, value) = kv.map_err(|e| CommitmentsError::Storage(e.to_string()))?;
            out.push(
                bincode::deserialize(&value)
                    .map_err(|e| CommitmentsError::Serialization(e.to_string()))?,
            );
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<(), CommitmentsError> {
        self.commitment
            .flush()
            .map_err(|e| CommitmentsError::Storage(e.to_string()))?;
        Ok(())
    }
}
