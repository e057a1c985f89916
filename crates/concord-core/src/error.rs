use thiserror::Error;

use crate::ids::{CellId, MemberId};

/// Shared error family for concerns that cut across every engine: storage,
/// serialization, and collaborator-contract violations. Each engine's own
/// error type carries a `#[from] CoreError` variant so `?` composes across
/// crate boundaries without manual mapping at every call site.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Member lookup ────────────────────────────────────────────────────
    #[error("member not found: {0:?}")]
    MemberNotFound(MemberId),

    #[error("member already exists: {0:?}")]
    MemberAlreadyExists(MemberId),

    #[error("member {0:?} is not active")]
    MemberNotActive(MemberId),

    // ── Cell lookup ──────────────────────────────────────────────────────
    #[error("cell not found: {0:?}")]
    CellNotFound(CellId),

    // ── Collaborator contract violations ─────────────────────────────────
    #[error("identity collaborator rejected member {0:?}")]
    IdentityRejected(MemberId),

    #[error("governance collaborator denied action: {0}")]
    NotAuthorized(String),

    // ── Serialization / storage ───────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    // ── General ───────────────────────────────────────────────────────────
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{0}")]
    Other(String),
}
