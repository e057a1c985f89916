//! Shared types for the Concord cellular mutual-credit protocol.
//!
//! This crate owns nothing that mutates: identifiers, the member/cell data
//! model, the collaborator contracts consumed by every engine, and the
//! shared error type. Ledger logic lives in `concord-ledger`.

pub mod collaborators;
pub mod constants;
pub mod error;
pub mod ids;
pub mod member;

pub use collaborators::{Clock, FederationTransport, Governance, Identity, Storage};
pub use error::CoreError;
pub use ids::{CellId, CommitmentId, FederationTxId, MemberId, TransactionId};
pub use member::{CellParameters, Member, MemberStatus};

/// Ledger balances, limits, and reserves are signed 128-bit integers.
///
/// Wide enough that a cell's aggregate capacity never approaches overflow
/// even under `max_limit` set to its widest configurable bound.
pub type Balance = i128;

/// Unix milliseconds, as returned by the `Clock` collaborator.
pub type Timestamp = i64;

/// Monotonically increasing per-cell mutation counter.
pub type SequenceNumber = u64;
