use serde::{Deserialize, Serialize};

pub use concord_core::CommitmentId;
use concord_core::{Balance, MemberId, Timestamp};

/// The nine reporting categories (§4.3). Used only for reporting and
/// simulation agent weighting, never for ledger arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Labor,
    Childcare,
    Eldercare,
    Education,
    Transport,
    Repair,
    Food,
    Healthcare,
    Other,
}

/// Whether fulfilment moves value immediately reserved capacity
/// (`Escrowed`) or only at the moment of fulfilment (`Soft`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitmentKind {
    Escrowed,
    Soft,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitmentStatus {
    Proposed,
    Active,
    Fulfilled,
    Cancelled,
    Disputed,
}

impl CommitmentStatus {
    pub fn name(self) -> &'static str {
        match self {
            CommitmentStatus::Proposed => "Proposed",
            CommitmentStatus::Active => "Active",
            CommitmentStatus::Fulfilled => "Fulfilled",
            CommitmentStatus::Cancelled => "Cancelled",
            CommitmentStatus::Disputed => "Disputed",
        }
    }

    /// Terminal statuses accept no further transition except the
    /// Disputed→{Fulfilled,Cancelled} resolution paths, handled explicitly
    /// by the engine rather than via this predicate.
    pub fn is_terminal(self) -> bool {
        matches!(self, CommitmentStatus::Fulfilled | CommitmentStatus::Cancelled)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FulfilmentConfirmation {
    pub confirmed_by: MemberId,
    pub rating: Option<u8>,
    pub notes: Option<String>,
}

/// A promise of future value between two members (§4.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Commitment {
    pub id: CommitmentId,
    pub kind: CommitmentKind,
    pub promisor: MemberId,
    pub promisee: MemberId,
    pub value: Balance,
    pub category: Category,
    pub description: String,
    pub due: Option<Timestamp>,
    pub status: CommitmentStatus,
    pub created_at: Timestamp,
    pub accepted_at: Option<Timestamp>,
    pub resolved_at: Option<Timestamp>,
    pub dispute_reason: Option<String>,
}
