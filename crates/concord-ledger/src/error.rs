use thiserror::Error;

use concord_core::{Balance, CellId, CoreError, MemberId};

/// Every mutating Ledger call returns one of these on failure, with no
/// partial mutation having taken place (§4.1 "Failure semantics").
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("conservation violated: deltas do not sum to zero")]
    ConservationViolation,

    #[error("floor violated for {member:?}: balance {balance} < -{limit}")]
    FloorViolation {
        member: MemberId,
        balance: Balance,
        limit: Balance,
    },

    #[error("escrow safety violated for {0:?}")]
    EscrowViolation(MemberId),

    #[error("reserve went negative for {0:?}")]
    NegativeReserve(MemberId),

    #[error("member not found: {0:?}")]
    MemberNotFound(MemberId),

    #[error("member not active: {0:?}")]
    MemberNotActive(MemberId),

    #[error("member already exists: {0:?}")]
    MemberAlreadyExists(MemberId),

    #[error("member {0:?} has nonzero balance, reserve, or active commitments")]
    NonZeroBalance(MemberId),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("cell not found: {0:?}")]
    CellNotFound(CellId),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
