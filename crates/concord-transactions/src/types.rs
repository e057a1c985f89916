use serde::{Deserialize, Serialize};

pub use concord_core::TransactionId;
use concord_core::{Balance, MemberId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Created,
    PayerSigned,
    FullySigned,
    Executed,
    Rejected,
}

impl TransactionStatus {
    pub fn name(self) -> &'static str {
        match self {
            TransactionStatus::Created => "Created",
            TransactionStatus::PayerSigned => "PayerSigned",
            TransactionStatus::FullySigned => "FullySigned",
            TransactionStatus::Executed => "Executed",
            TransactionStatus::Rejected => "Rejected",
        }
    }
}

/// A spot transfer moving through `create_spot → sign_as_payer →
/// sign_as_payee → execute` (§4.2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub payer: MemberId,
    pub payee: MemberId,
    pub amount: Balance,
    pub description: String,
    pub created_at: Timestamp,
    pub nonce: u64,
    pub payer_signature: Option<Vec<u8>>,
    pub payee_signature: Option<Vec<u8>>,
    pub status: TransactionStatus,
}

/// The signed view, excluding the id and signature fields it authenticates —
/// mirrors the reference stack's borrowing `TransactionBody<'a>` pattern so
/// the canonical bytes can never include what they're meant to authenticate.
#[derive(Serialize)]
pub struct TransactionBody<'a> {
    pub payer: &'a MemberId,
    pub payee: &'a MemberId,
    pub amount: Balance,
    pub description: &'a str,
    pub created_at: Timestamp,
    pub nonce: u64,
}

impl Transaction {
    pub fn body(&self) -> TransactionBody<'_> {
        TransactionBody {
            payer: &self.payer,
            payee: &self.payee,
            amount: self.amount,
            description: &self.description,
            created_at: self.created_at,
            nonce: self.nonce,
        }
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        bincode::serialize(&self.body()).expect("transaction body serialization is infallible")
    }
}

/// One entry in the offline queue, ordered FIFO by `queued_at`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueEntry {
    pub tx_id: TransactionId,
    pub queued_at: Timestamp,
    pub attempts: u32,
    pub last_error: Option<String>,
}
