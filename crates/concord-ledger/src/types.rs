use serde::{Deserialize, Serialize};

use concord_core::{Balance, CommitmentId, MemberId};

/// One leg of an `apply_balance_updates` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub member: MemberId,
    pub delta: Balance,
    pub reason: String,
    pub reference: Option<String>,
}

impl BalanceUpdate {
    pub fn new(member: MemberId, delta: Balance, reason: impl Into<String>) -> Self {
        Self {
            member,
            delta,
            reason: reason.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// An `apply_reserve_update` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReserveUpdate {
    pub member: MemberId,
    pub delta: Balance,
    pub reason: String,
    pub commitment_id: Option<CommitmentId>,
}

impl ReserveUpdate {
    pub fn new(member: MemberId, delta: Balance, reason: impl Into<String>) -> Self {
        Self {
            member,
            delta,
            reason: reason.into(),
            commitment_id: None,
        }
    }

    pub fn for_commitment(mut self, commitment_id: CommitmentId) -> Self {
        self.commitment_id = Some(commitment_id);
        self
    }
}

/// Ledger-wide statistics (§4.1). `aggregate_capacity` sums `limit` over every
/// member this ledger tracks — including any reserved clearing-account
/// entries, since the Ledger itself has no notion of "clearing account"; the
/// Federation engine excludes them when computing Λ for the exposure cap.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub member_count: usize,
    pub active_member_count: usize,
    pub aggregate_capacity: Balance,
    pub floor_mass: Balance,
    pub balance_variance: f64,
    pub total_reserved: Balance,
    pub balance_sum: Balance,
    pub positive_sum: Balance,
    pub negative_sum: Balance,
}
