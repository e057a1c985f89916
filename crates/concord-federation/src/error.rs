use thiserror::Error;

use concord_core::{Balance, CellId, CoreError, MemberId};
use concord_ledger::LedgerError;

use crate::types::FederationTxId;

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("no link to cell {0:?}")]
    LinkNotFound(CellId),

    #[error("link to {0:?} already exists")]
    LinkAlreadyExists(CellId),

    #[error("link to {0:?} is not Active")]
    LinkNotActive(CellId),

    #[error("this cell is quarantined")]
    Quarantined,

    #[error("exposure cap exceeded: |{position} {sign} {amount}| > {cap}")]
    CapExceeded {
        position: Balance,
        sign: &'static str,
        amount: Balance,
        cap: Balance,
    },

    #[error("federation is frozen: beta factor is zero, exposure cap collapsed to zero")]
    FederationFrozen,

    #[error("member not active: {0:?}")]
    MemberNotActive(MemberId),

    #[error("target rejected transfer {0}: {1}")]
    TargetRejected(FederationTxId, String),

    #[error("transport error for transfer {0}: {1}")]
    TransportError(FederationTxId, String),

    #[error("federation transfer not found: {0}")]
    TransferNotFound(FederationTxId),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
