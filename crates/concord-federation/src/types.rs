use serde::{Deserialize, Serialize};

pub use concord_core::FederationTxId;
use concord_core::{Balance, CellId, MemberId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Pending,
    Active,
    Suspended,
}

/// This cell's view of its bilateral relationship with one remote cell
/// (§4.4 "Link protocol"). `position` is the net flow since establishment —
/// positive when the remote cell owes this cell, negative the reverse.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BilateralLink {
    pub remote_cell: CellId,
    pub status: LinkStatus,
    pub position: Balance,
    pub established_at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FederationTxStatus {
    Pending,
    Completed,
    RolledBack,
    Rejected,
}

/// One inter-cell transfer attempt, persisted on both the source and target
/// side for the idempotency guarantee in §4.4 step 5: a duplicate id seen
/// again at either side is a no-op that returns the prior recorded result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FederationTx {
    pub id: FederationTxId,
    pub source_cell: CellId,
    pub target_cell: CellId,
    pub payer: MemberId,
    pub payee: MemberId,
    pub amount: Balance,
    pub status: FederationTxStatus,
    pub reason: Option<String>,
    pub created_at: Timestamp,
}

/// Per-cell federation meta: quarantine flag and the dynamic beta factor
/// Emergency pushes (§4.5's `federation_beta_factor`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FederationMeta {
    pub quarantined: bool,
    pub quarantine_reason: Option<String>,
    pub beta_factor: f64,
}

impl Default for FederationMeta {
    fn default() -> Self {
        Self {
            quarantined: false,
            quarantine_reason: None,
            beta_factor: 1.0,
        }
    }
}
