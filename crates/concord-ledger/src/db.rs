//! Sled-backed persistence for a single cell's ledger.
//!
//! | Tree | Key | Value |
//! |---|---|---|
//! | `ledger` | `cell_id` bytes (32) | bincode [`CellMeta`] |
//! | `member` | `member_id` bytes (32) | bincode [`Member`] |
//! | `event` | big-endian `u64` sequence number | bincode [`LedgerEvent`] |
//!
//! This mirrors the document-family-per-tree layout of §6's persisted state
//! namespace: `ledger:{cell}`, `member:{member}`, `event:{seq}` become three
//! named trees rather than three key prefixes in one tree.

use std::path::Path;

use concord_core::{CellId, CellParameters, Member, MemberId, MemberStatus, SequenceNumber, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellMeta {
    pub cell_id: CellId,
    pub parameters: CellParameters,
    pub sequence_number: SequenceNumber,
    pub last_updated: Timestamp,
}

/// One successful mutation, appended to the `event` tree in strictly
/// monotonic sequence order — the authoritative replay source (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub cell_id: CellId,
    pub event_type: LedgerEventType,
    pub sequence_number: SequenceNumber,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LedgerEventType {
    MemberAdded {
        member: MemberId,
        limit: concord_core::Balance,
    },
    MemberRemoved {
        member: MemberId,
    },
    BalancesUpdated {
        deltas: Vec<(MemberId, concord_core::Balance)>,
        reason: String,
    },
    ReserveUpdated {
        member: MemberId,
        delta: concord_core::Balance,
        reason: String,
    },
    SettlementApplied {
        reserve_member: MemberId,
        reserve_delta: concord_core::Balance,
        deltas: Vec<(MemberId, concord_core::Balance)>,
        reason: String,
    },
    LimitUpdated {
        member: MemberId,
        new_limit: concord_core::Balance,
    },
    StatusUpdated {
        member: MemberId,
        status: MemberStatus,
    },
}

pub struct LedgerDb {
    ledger: sled::Tree,
    member: sled::Tree,
    event: sled::Tree,
}

impl LedgerDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db = sled::open(path).map_err(|e| LedgerError::Storage(e.to_string()))?;
        let ledger = db
            .open_tree("ledger")
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let member = db
            .open_tree("member")
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let event = db
            .open_tree("event")
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(Self {
            ledger,
            member,
            event,
        })
    }

    pub fn get_cell_meta(&self, cell_id: &CellId) -> Result<Option<CellMeta>, LedgerError> {
        let raw = self
            .ledger
            .get(cell_id.as_bytes())
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        raw.map(|bytes| {
            bincode::deserialize(&bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
        })
        .transpose()
    }

    pub fn put_cell_meta(&self, meta: &CellMeta) -> Result<(), LedgerError> {
        let bytes =
            bincode::serialize(meta).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        self.ledger
            .insert(meta.cell_id.as_bytes(), bytes)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_member(&self, id: &MemberId) -> Result<Option<Member>, LedgerError> {
        let raw = self
            .member
            .get(id.as_bytes())
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        raw.map(|bytes| {
            bincode::deserialize(&bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
        })
        .transpose()
    }

    pub fn put_member(&self, member: &Member) -> Result<(), LedgerError> {
        let bytes =
            bincode::serialize(member).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        self.member
            .insert(member.id.as_bytes(), bytes)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn delete_member(&self, id: &MemberId) -> Result<(), LedgerError> {
        self.member
            .remove(id.as_bytes())
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn iter_members(&self) -> Result<Vec<Member>, LedgerError> {
        let mut out = Vec::new();
        for kv in self.member.iter() {
            let (_, value) = kv.map_err(|e| LedgerError::Storage(e.to_string()))?;
            out.push(
                bincode::deserialize(&value).map_err(|e| LedgerError::Serialization(e.to_string()))?,
            );
        }
        Ok(out)
    }

    pub fn count_members(&self) -> usize {
        self.member.len()
    }

    pub fn append_event(&self, event: &LedgerEvent) -> Result<(), LedgerError> {
        let key = event.sequence_number.to_be_bytes();
        let bytes =
            bincode::serialize(event).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        self.event
            .insert(key, bytes)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All events in ascending sequence order — the replay source for §8's
    /// "replaying the event log from an empty state reproduces the current
    /// state exactly" property.
    pub fn iter_events(&self) -> Result<Vec<LedgerEvent>, LedgerError> {
        let mut out = Vec::new();
        for kv in self.event.iter() {
            let (_, value) = kv.map_err(|e| LedgerError::Storage(e.to_string()))?;
            out.push(
                bincode::deserialize(&value).map_err(|e| LedgerError::Serialization(e.to_string()))?,
            );
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        self.ledger
            .flush()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        self.member
            .flush()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        self.event
            .flush()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }
}
