use thiserror::Error;

#[derive(Debug, Error)]
pub enum HardeningError {
    #[error("ledger error: {0}")]
    Ledger(#[from] concord_ledger::LedgerError),

    #[error("transactions error: {0}")]
    Transactions(#[from] concord_transactions::TransactionsError),

    #[error("commitments error: {0}")]
    Commitments(#[from] concord_commitments::CommitmentsError),

    #[error("federation error: {0}")]
    Federation(#[from] concord_federation::FederationError),

    #[error("emergency error: {0}")]
    Emergency(#[from] concord_emergency::EmergencyError),

    #[error(transparent)]
    Core(#[from] concord_core::CoreError),
}
