use thiserror::Error;

use concord_core::{CoreError, MemberId};
use concord_ledger::LedgerError;

#[derive(Debug, Error)]
pub enum EmergencyError {
    #[error("actor {0:?} is not authorized to override emergency state")]
    NotAuthorized(MemberId),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
