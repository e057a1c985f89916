use std::path::Path;
use std::sync::Arc;

use concord_core::{Balance, Identity, MemberId, SequenceNumber, Timestamp};
use concord_ledger::{BalanceUpdate, Ledger};

use crate::db::TransactionDb;
use crate::error::TransactionsError;
use crate::types::{QueueEntry, Transaction, TransactionId, TransactionStatus};

/// Drives the spot-transaction lifecycle against a shared [`Ledger`] (§4.2).
pub struct TransactionEngine {
    db: TransactionDb,
    ledger: Arc<Ledger>,
    identity: Arc<dyn Identity>,
}

impl TransactionEngine {
    pub fn open(
        path: impl AsRef<Path>,
        ledger: Arc<Ledger>,
        identity: Arc<dyn Identity>,
    ) -> Result<Self, TransactionsError> {
        Ok(Self {
            db: TransactionDb::open(path)?,
            ledger,
            identity,
        })
    }

    fn member_active(&self, id: &MemberId) -> Result<bool, TransactionsError> {
        Ok(self.ledger.member(id)?.status.can_transact())
    }

    fn get(&self, id: &TransactionId) -> Result<Transaction, TransactionsError> {
        self.db
            .get(id)?
            .ok_or(TransactionsError::NotFound(*id))
    }

    /// `create_spot` — validates payer/payee distinctness, both Active, and
    /// `amount > 0`; rejects a reused id.
    #[allow(clippy::too_many_arguments)]
    pub fn create_spot(
        &self,
        id: TransactionId,
        payer: MemberId,
        payee: MemberId,
        amount: Balance,
        description: impl Into<String>,
        nonce: u64,
        now: Timestamp,
    ) -> Result<Transaction, TransactionsError> {
        if self.db.get(&id)?.is_some() {
            return Err(TransactionsError::DuplicateTransaction(id));
        }
        if payer == payee {
            return Err(TransactionsError::SameMember);
        }
        if amount <= 0 {
            return Err(TransactionsError::InvalidAmount(amount));
        }
        if !self.member_active(&payer)? {
            return Err(TransactionsError::MemberNotActive(payer));
        }
        if !self.member_active(&payee)? {
            return Err(TransactionsError::MemberNotActive(payee));
        }

        let tx = Transaction {
            id,
            payer,
            payee,
            amount,
            description: description.into(),
            created_at: now,
            nonce,
            payer_signature: None,
            payee_signature: None,
            status: TransactionStatus::Created,
        };
        self.db.put(&tx)?;
        tracing::debug!(tx = %id, "transaction created");
        Ok(tx)
    }

    /// `sign_as_payer` — verifies `signature` against the canonical body
    /// bytes using the identity collaborator; never inspects key material
    /// itself.
    pub fn sign_as_payer(
        &self,
        id: &TransactionId,
        signature: Vec<u8>,
    ) -> Result<Transaction, TransactionsError> {
        let mut tx = self.get(id)?;
        if tx.status != TransactionStatus::Created {
            return Err(TransactionsError::InvalidStatusTransition {
                tx: *id,
                from: tx.status.name(),
            });
        }
        if !self.identity.verify(&tx.payer, &tx.body_bytes(), &signature) {
            return Err(TransactionsError::InvalidPayerSignature);
        }
        tx.payer_signature = Some(signature);
        tx.status = TransactionStatus::PayerSigned;
        self.db.put(&tx)?;
        Ok(tx)
    }

    /// `sign_as_payee` — same verification, completes the signature pair.
    pub fn sign_as_payee(
        &self,
        id: &TransactionId,
        signature: Vec<u8>,
    ) -> Result<Transaction, TransactionsError> {
        let mut tx = self.get(id)?;
        if tx.status != TransactionStatus::PayerSigned {
            return Err(TransactionsError::InvalidStatusTransition {
                tx: *id,
                from: tx.status.name(),
            });
        }
        if !self.identity.verify(&tx.payee, &tx.body_bytes(), &signature) {
            return Err(TransactionsError::InvalidPayeeSignature);
        }
        tx.payee_signature = Some(signature);
        tx.status = TransactionStatus::FullySigned;
        self.db.put(&tx)?;
        Ok(tx)
    }

    /// `execute` — re-validates every create-time check against current
    /// ledger state, rejects with `InsufficientCapacity` if the payer can't
    /// cover `amount`, then applies `[{payer, -amount}, {payee, +amount}]`
    /// inside one `Ledger` critical section. On success, transitions to
    /// Executed; on an expected failure (capacity, frozen counterparty) the
    /// transaction is left `FullySigned` for the caller to retry or queue.
    pub fn execute(
        &self,
        id: &TransactionId,
        now: Timestamp,
    ) -> Result<SequenceNumber, TransactionsError> {
        let mut tx = self.get(id)?;
        if tx.status != TransactionStatus::FullySigned {
            return Err(TransactionsError::InvalidStatusTransition {
                tx: *id,
                from: tx.status.name(),
            });
        }
        let Some(payer_sig) = &tx.payer_signature else {
            return Err(TransactionsError::MissingPayerSignature);
        };
        let Some(payee_sig) = &tx.payee_signature else {
            return Err(TransactionsError::MissingPayeeSignature);
        };
        if !self.identity.verify(&tx.payer, &tx.body_bytes(), payer_sig) {
            return Err(TransactionsError::InvalidPayerSignature);
        }
        if !self.identity.verify(&tx.payee, &tx.body_bytes(), payee_sig) {
            return Err(TransactionsError::InvalidPayeeSignature);
        }
        if !self.member_active(&tx.payer)? {
            return Err(TransactionsError::MemberNotActive(tx.payer));
        }
        if !self.member_active(&tx.payee)? {
            return Err(TransactionsError::MemberNotActive(tx.payee));
        }
        if !self.ledger.can_spend(&tx.payer, tx.amount)? {
            return Err(TransactionsError::InsufficientCapacity {
                payer: tx.payer,
                amount: tx.amount,
            });
        }

        let seq = self.ledger.apply_balance_updates(
            &[
                BalanceUpdate::new(tx.payer, -tx.amount, "spot transfer"),
                BalanceUpdate::new(tx.payee, tx.amount, "spot transfer"),
            ],
            now,
        )?;
        tx.status = TransactionStatus::Executed;
        self.db.put(&tx)?;
        tracing::info!(tx = %id, sequence_number = seq, "transaction executed");
        Ok(seq)
    }

    /// Appends `id` to the offline queue. No transaction is silently
    /// dropped: once queued, it stays until `process_offline_queue`
    /// succeeds for it or the caller explicitly removes it.
    pub fn queue_offline(&self, id: &TransactionId, now: Timestamp) -> Result<(), TransactionsError> {
        self.db.enqueue(&QueueEntry {
            tx_id: *id,
            queued_at: now,
            attempts: 0,
            last_error: None,
        })?;
        Ok(())
    }

    /// Re-validates each queued transaction against the *current* ledger
    /// state in FIFO order, executing those that still pass. Transactions
    /// that fail remain queued with an incremented attempt count and the
    /// latest error.
    pub fn process_offline_queue(&self, now: Timestamp) -> Result<Vec<TransactionId>, TransactionsError> {
        let mut executed = Vec::new();
        for entry in self.db.iter_queue()? {
            match self.execute(&entry.tx_id, now) {
                Ok(_) => {
                    self.db.remove_from_queue(entry.queued_at, &entry.tx_id)?;
                    executed.push(entry.tx_id);
                }
                Err(err) => {
                    self.db.remove_from_queue(entry.queued_at, &entry.tx_id)?;
                    self.db.enqueue(&QueueEntry {
                        tx_id: entry.tx_id,
                        queued_at: entry.queued_at,
                        attempts: entry.attempts + 1,
                        last_error: Some(err.to_string()),
                    })?;
                }
            }
        }
        Ok(executed)
    }

    pub fn flush(&self) -> Result<(), TransactionsError> {
        self.db.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::collaborators::testing::StubIdentity;
    use concord_core::{CellId, CellParameters};

    fn temp_engine(
        name: &str,
        members: &[(MemberId, &str)],
    ) -> (TransactionEngine, Arc<Ledger>) {
        let ledger_dir = std::env::temp_dir().join(format!("concord_tx_ledger_{name}"));
        let tx_dir = std::env::temp_dir().join(format!("concord_tx_db_{name}"));
        let _ = std::fs::remove_dir_all(&ledger_dir);
        let _ = std::fs::remove_dir_all(&tx_dir);
        let ledger = Arc::new(
            Ledger::open(&ledger_dir, CellId::from_bytes([9u8; 32]), CellParameters::default(), 0)
                .unwrap(),
        );
        let mut identity = StubIdentity::new();
        for (member, key) in members {
            identity.register(*member, key.as_bytes().to_vec());
        }
        let engine = TransactionEngine::open(&tx_dir, ledger.clone(), Arc::new(identity)).unwrap();
        (engine, ledger)
    }

    fn sign(member: MemberId, pubkey: &str, body: &[u8]) -> Vec<u8> {
        let mut want = member.as_bytes().to_vec();
        want.extend_from_slice(body);
        want.extend_from_slice(pubkey.as_bytes());
        blake3::hash(&want).as_bytes().to_vec()
    }

    #[test]
    fn full_lifecycle_executes_and_conserves() {
        let payer = MemberId::from_bytes([1u8; 32]);
        let payee = MemberId::from_bytes([2u8; 32]);
        let (engine, ledger) = temp_engine(
            "full_lifecycle_executes_and_conserves",
            &[(payer, "pk-payer"), (payee, "pk-payee")],
        );
        ledger.add_member(payer, Some(100), 0).unwrap();
        ledger.add_member(payee, Some(100), 0).unwrap();

        let id = TransactionId::from_bytes([5u8; 16]);
        let tx = engine
            .create_spot(id, payer, payee, 30, "rent", 1, 0)
            .unwrap();
        let body = tx.body_bytes();
        engine
            .sign_as_payer(&id, sign(payer, "pk-payer", &body))
            .unwrap();
        engine
            .sign_as_payee(&id, sign(payee, "pk-payee", &body))
            .unwrap();
        engine.execute(&id, 1).unwrap();

        assert_eq!(ledger.member(&payer).unwrap().balance, -30);
        assert_eq!(ledger.member(&payee).unwrap().balance, 30);
        assert!(ledger.verify_conservation().unwrap());
    }

    #[test]
    fn duplicate_transaction_id_rejected() {
        let payer = MemberId::from_bytes([3u8; 32]);
        let payee = MemberId::from_bytes([4u8; 32]);
        let (engine, ledger) = temp_engine(
            "duplicate_transaction_id_rejected",
            &[(payer, "pk"), (payee, "pk2")],
        );
        ledger.add_member(payer, Some(100), 0).unwrap();
        ledger.add_member(payee, Some(100), 0).unwrap();
        let id = TransactionId::from_bytes([6u8; 16]);
        engine.create_spot(id, payer, payee, 10, "x", 1, 0).unwrap();
        let err = engine
            .create_spot(id, payer, payee, 10, "x", 2, 0)
            .unwrap_err();
        assert!(matches!(err, TransactionsError::DuplicateTransaction(_)));
    }

    #[test]
    fn amount_over_capacity_rejected_at_execute() {
        let payer = MemberId::from_bytes([15u8; 32]);
        let payee = MemberId::from_bytes([16u8; 32]);
        let (engine, ledger) = temp_engine(
            "amount_over_capacity_rejected_at_execute",
            &[(payer, "pk"), (payee, "pk2")],
        );
        ledger.add_member(payer, Some(100), 0).unwrap();
        ledger.add_member(payee, Some(100), 0).unwrap();
        let amount = ledger.available_capacity(&payer).unwrap() + 1;

        let id = TransactionId::from_bytes([14u8; 16]);
        let tx = engine
            .create_spot(id, payer, payee, amount, "over capacity", 1, 0)
            .unwrap();
        let body = tx.body_bytes();
        engine
            .sign_as_payer(&id, sign(payer, "pk", &body))
            .unwrap();
        engine
            .sign_as_payee(&id, sign(payee, "pk2", &body))
            .unwrap();

        let err = engine.execute(&id, 1).unwrap_err();
        assert!(matches!(err, TransactionsError::InsufficientCapacity { .. }));
    }

    #[test]
    fn same_member_rejected() {
        let payer = MemberId::from_bytes([7u8; 32]);
        let (engine, ledger) = temp_engine("same_member_rejected", &[(payer, "pk")]);
        ledger.add_member(payer, Some(100), 0).unwrap();
        let id = TransactionId::from_bytes([8u8; 16]);
        let err = engine
            .create_spot(id, payer, payer, 10, "x", 1, 0)
            .unwrap_err();
        assert!(matches!(err, TransactionsError::SameMember));
    }

    #[test]
    fn offline_queue_retries_and_updates_error() {
        let payer = MemberId::from_bytes([11u8; 32]);
        let payee = MemberId::from_bytes([12u8; 32]);
        let (engine, ledger) = temp_engine(
            "offline_queue_retries_and_updates_error",
            &[(payer, "pk"), (payee, "pk2")],
        );
        ledger.add_member(payer, Some(10), 0).unwrap();
        ledger.add_member(payee, Some(10), 0).unwrap();

        let id = TransactionId::from_bytes([13u8; 16]);
        let tx = engine
            .create_spot(id, payer, payee, 100, "too big", 1, 0)
            .unwrap();
        let body = tx.body_bytes();
        engine
            .sign_as_payer(&id, sign(payer, "pk", &body))
            .unwrap();
        engine
            .sign_as_payee(&id, sign(payee, "pk2", &body))
            .unwrap();

        engine.queue_offline(&id, 0).unwrap();
        let executed = engine.process_offline_queue(1).unwrap();
        assert!(executed.is_empty());
        let entries = engine.db.iter_queue().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 1);
        assert!(entries[0].last_error.is_some());
    }
}
