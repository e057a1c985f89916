use thiserror::Error;

use concord_core::{Balance, CommitmentId, CoreError, MemberId};
use concord_ledger::LedgerError;

#[derive(Debug, Error)]
pub enum CommitmentsError {
    #[error("commitment not found: {0}")]
    NotFound(CommitmentId),

    #[error("duplicate commitment id: {0}")]
    DuplicateCommitment(CommitmentId),

    #[error("promisor and promisee must be distinct")]
    SameMember,

    #[error("invalid value: {0}")]
    InvalidValue(Balance),

    #[error("member not active: {0:?}")]
    MemberNotActive(MemberId),

    #[error("insufficient available capacity for escrow: {0:?}")]
    InsufficientCapacity(MemberId),

    #[error("illegal transition from {from} for {commitment}")]
    InvalidStatusTransition {
        commitment: CommitmentId,
        from: &'static str,
    },

    #[error("only the promisee may confirm fulfilment")]
    NotPromisee,

    #[error("only promisor, promisee, or governance may cancel")]
    NotAuthorizedToCancel,

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
