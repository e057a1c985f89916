use thiserror::Error;

use concord_core::{Balance, CoreError, MemberId, TransactionId};
use concord_ledger::LedgerError;

/// Failures from the spot-transaction lifecycle (§4.2). Expected failures
/// (insufficient capacity, frozen counterparty, bad signature) are reported
/// to the caller without retry; only `Storage` indicates the caller should
/// decide whether to retry.
#[derive(Debug, Error)]
pub enum TransactionsError {
    #[error("transaction not found: {0}")]
    NotFound(TransactionId),

    #[error("duplicate transaction id: {0}")]
    DuplicateTransaction(TransactionId),

    #[error("payer and payee must be distinct")]
    SameMember,

    #[error("invalid amount: {0}")]
    InvalidAmount(Balance),

    #[error("member not active: {0:?}")]
    MemberNotActive(MemberId),

    #[error("insufficient capacity: payer {payer:?} cannot spend {amount}")]
    InsufficientCapacity { payer: MemberId, amount: Balance },

    #[error("payer signature missing")]
    MissingPayerSignature,

    #[error("payee signature missing")]
    MissingPayeeSignature,

    #[error("payer signature does not verify")]
    InvalidPayerSignature,

    #[error("payee signature does not verify")]
    InvalidPayeeSignature,

    #[error("illegal transition from {from} for {tx}")]
    InvalidStatusTransition { tx: TransactionId, from: &'static str },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
