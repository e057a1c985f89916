use std::path::Path;
use std::sync::Arc;

use concord_core::{Balance, Governance, MemberId, SequenceNumber, Timestamp};
use concord_ledger::{BalanceUpdate, Ledger, ReserveUpdate};

use crate::db::CommitmentDb;
use crate::error::CommitmentsError;
use crate::types::{
    Category, Commitment, CommitmentId, CommitmentKind, CommitmentStatus, FulfilmentConfirmation,
};

/// Drives the future-dated-obligation lifecycle (§4.3): `Proposed → Active →
/// {Fulfilled, Cancelled, Disputed}`, with `Disputed → {Fulfilled,
/// Cancelled}` as the only exit from a dispute.
pub struct CommitmentEngine {
    db: CommitmentDb,
    ledger: Arc<Ledger>,
    governance: Arc<dyn Governance>,
}

impl CommitmentEngine {
    pub fn open(
        path: impl AsRef<Path>,
        ledger: Arc<Ledger>,
        governance: Arc<dyn Governance>,
    ) -> Result<Self, CommitmentsError> {
        Ok(Self {
            db: CommitmentDb::open(path)?,
            ledger,
            governance,
        })
    }

    fn member_active(&self, id: &MemberId) -> Result<bool, CommitmentsError> {
        Ok(self.ledger.member(id)?.status.can_transact())
    }

    fn get(&self, id: &CommitmentId) -> Result<Commitment, CommitmentsError> {
        self.db.get(id)?.ok_or(CommitmentsError::NotFound(*id))
    }

    /// `create_commitment` — both members Active, distinct, `value > 0`; for
    /// Escrowed, `promisor.available_capacity >= value`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_commitment(
        &self,
        id: CommitmentId,
        kind: CommitmentKind,
        promisor: MemberId,
        promisee: MemberId,
        value: Balance,
        category: Category,
        description: impl Into<String>,
        due: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<Commitment, CommitmentsError> {
        if self.db.get(&id)?.is_some() {
            return Err(CommitmentsError::DuplicateCommitment(id));
        }
        if promisor == promisee {
            return Err(CommitmentsError::SameMember);
        }
        if value <= 0 {
            return Err(CommitmentsError::InvalidValue(value));
        }
        if !self.member_active(&promisor)? {
            return Err(CommitmentsError::MemberNotActive(promisor));
        }
        if !self.member_active(&promisee)? {
            return Err(CommitmentsError::MemberNotActive(promisee));
        }
        if matches!(kind, CommitmentKind::Escrowed)
            && self.ledger.available_capacity(&promisor)? < value
        {
            return Err(CommitmentsError::InsufficientCapacity(promisor));
        }

        let commitment = Commitment {
            id,
            kind,
            promisor,
            promisee,
            value,
            category,
            description: description.into(),
            due,
            status: CommitmentStatus::Proposed,
            created_at: now,
            accepted_at: None,
            resolved_at: None,
            dispute_reason: None,
        };
        self.db.put(&commitment)?;
        tracing::debug!(commitment = %id, "commitment created");
        Ok(commitment)
    }

    /// `accept_commitment` — promisee signs. For Escrowed, this is the
    /// single point at which `apply_reserve_update(+value)` fires against
    /// the promisor.
    pub fn accept_commitment(
        &self,
        id: &CommitmentId,
        accepter: MemberId,
        now: Timestamp,
    ) -> Result<Commitment, CommitmentsError> {
        let mut commitment = self.get(id)?;
        if commitment.status != CommitmentStatus::Proposed {
            return Err(CommitmentsError::InvalidStatusTransition {
                commitment: *id,
                from: commitment.status.name(),
            });
        }
        if accepter != commitment.promisee {
            return Err(CommitmentsError::NotPromisee);
        }
        if matches!(commitment.kind, CommitmentKind::Escrowed) {
            self.ledger.apply_reserve_update(
                ReserveUpdate::new(commitment.promisor, commitment.value, "commitment escrow")
                    .for_commitment(*id),
                now,
            )?;
        }
        commitment.status = CommitmentStatus::Active;
        commitment.accepted_at = Some(now);
        self.db.put(&commitment)?;
        Ok(commitment)
    }

    /// `fulfill_commitment` — only the promisee may confirm. If Escrowed,
    /// releases the reserve and settles the payment through a single
    /// atomic `Ledger::apply_settlement` call — §4.3 requires the release
    /// and the payment to land together or not at all, since a promisee
    /// near their floor can make the payment leg fail on its own and must
    /// not leave the promisor's reserve already freed against a commitment
    /// that stays Active. Soft commitments have no reserve, so only the
    /// balance update runs.
    pub fn fulfill_commitment(
        &self,
        id: &CommitmentId,
        confirmation: FulfilmentConfirmation,
        now: Timestamp,
    ) -> Result<SequenceNumber, CommitmentsError> {
        let mut commitment = self.get(id)?;
        if commitment.status != CommitmentStatus::Active {
            return Err(CommitmentsError::InvalidStatusTransition {
                commitment: *id,
                from: commitment.status.name(),
            });
        }
        if confirmation.confirmed_by != commitment.promisee {
            return Err(CommitmentsError::NotPromisee);
        }

        let balance_updates = [
            BalanceUpdate::new(commitment.promisor, -commitment.value, "commitment fulfilled"),
            BalanceUpdate::new(commitment.promisee, commitment.value, "commitment fulfilled"),
        ];
        let seq = if matches!(commitment.kind, CommitmentKind::Escrowed) {
            self.ledger.apply_settlement(
                ReserveUpdate::new(commitment.promisor, -commitment.value, "commitment fulfilled")
                    .for_commitment(*id),
                &balance_updates,
                now,
            )?
        } else {
            self.ledger.apply_balance_updates(&balance_updates, now)?
        };

        commitment.status = CommitmentStatus::Fulfilled;
        commitment.resolved_at = Some(now);
        self.db.put(&commitment)?;
        tracing::info!(commitment = %id, sequence_number = seq, "commitment fulfilled");
        Ok(seq)
    }

    /// `cancel_commitment` — legal before Fulfilled. Releases any Active
    /// Escrowed reserve. Authority: promisor or promisee while Proposed;
    /// mutual consent or governance while Active; rejected once
    /// Fulfilled/Cancelled/Disputed.
    pub fn cancel_commitment(
        &self,
        id: &CommitmentId,
        initiator: MemberId,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), CommitmentsError> {
        let mut commitment = self.get(id)?;
        match commitment.status {
            CommitmentStatus::Proposed => {
                if initiator != commitment.promisor && initiator != commitment.promisee {
                    return Err(CommitmentsError::NotAuthorizedToCancel);
                }
            }
            CommitmentStatus::Active => {
                let is_party = initiator == commitment.promisor || initiator == commitment.promisee;
                if !(is_party || self.governance.is_authorized(&initiator, "cancel_commitment")) {
                    return Err(CommitmentsError::NotAuthorizedToCancel);
                }
                if matches!(commitment.kind, CommitmentKind::Escrowed) {
                    self.ledger.apply_reserve_update(
                        ReserveUpdate::new(commitment.promisor, -commitment.value, "commitment cancelled")
                            .for_commitment(*id),
                        now,
                    )?;
                }
            }
            _ => {
                return Err(CommitmentsError::InvalidStatusTransition {
                    commitment: *id,
                    from: commitment.status.name(),
                });
            }
        }

        commitment.status = CommitmentStatus::Cancelled;
        commitment.resolved_at = Some(now);
        commitment.dispute_reason = Some(reason.into());
        self.db.put(&commitment)?;
        Ok(())
    }

    /// `dispute_commitment` — moves an Active commitment to Disputed,
    /// pending governance resolution.
    pub fn dispute_commitment(
        &self,
        id: &CommitmentId,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), CommitmentsError> {
        let mut commitment = self.get(id)?;
        if commitment.status != CommitmentStatus::Active {
            return Err(CommitmentsError::InvalidStatusTransition {
                commitment: *id,
                from: commitment.status.name(),
            });
        }
        commitment.status = CommitmentStatus::Disputed;
        commitment.dispute_reason = Some(reason.into());
        let _ = now;
        self.db.put(&commitment)?;
        Ok(())
    }

    /// Resolves a Disputed commitment via governance, either fulfilling it
    /// (optionally at an adjusted value) or cancelling it.
    pub fn resolve_dispute(
        &self,
        id: &CommitmentId,
        resolver: MemberId,
        adjusted_value: Option<Balance>,
        fulfil: bool,
        now: Timestamp,
    ) -> Result<(), CommitmentsError> {
        let mut commitment = self.get(id)?;
        if commitment.status != CommitmentStatus::Disputed {
            return Err(CommitmentsError::InvalidStatusTransition {
                commitment: *id,
                from: commitment.status.name(),
            });
        }
        if !self.governance.is_authorized(&resolver, "resolve_dispute") {
            return Err(CommitmentsError::NotAuthorizedToCancel);
        }
        if let Some(value) = adjusted_value {
            commitment.value = value;
        }
        commitment.status = CommitmentStatus::Active;
        self.db.put(&commitment)?;

        if fulfil {
            self.fulfill_commitment(
                id,
                FulfilmentConfirmation {
                    confirmed_by: commitment.promisee,
                    rating: None,
                    notes: Some("resolved via dispute".into()),
                },
                now,
            )?;
        } else {
            self.cancel_commitment(id, commitment.promisor, "resolved via dispute", now)?;
        }
        Ok(())
    }

    /// Count of non-terminal commitments where `member` is either party —
    /// the input `Ledger::remove_member` needs for its own guard, since the
    /// ledger does not own commitments.
    pub fn active_commitment_count(&self, member: &MemberId) -> Result<u32, CommitmentsError> {
        let count = self
            .db
            .iter()?
            .into_iter()
            .filter(|c| !c.status.is_terminal() && (c.promisor == *member || c.promisee == *member))
            .count();
        Ok(count as u32)
    }

    pub fn flush(&self) -> Result<(), CommitmentsError> {
        self.db.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::collaborators::testing::PermissiveGovernance;
    use concord_core::{CellId, CellParameters};

    fn temp_engine(name: &str) -> (CommitmentEngine, Arc<Ledger>) {
        let ledger_dir = std::env::temp_dir().join(format!("concord_commit_ledger_{name}"));
        let commit_dir = std::env::temp_dir().join(format!("concord_commit_db_{name}"));
        let _ = std::fs::remove_dir_all(&ledger_dir);
        let _ = std::fs::remove_dir_all(&commit_dir);
        let ledger = Arc::new(
            Ledger::open(&ledger_dir, CellId::from_bytes([4u8; 32]), CellParameters::default(), 0)
                .unwrap(),
        );
        let engine =
            CommitmentEngine::open(&commit_dir, ledger.clone(), Arc::new(PermissiveGovernance)).unwrap();
        (engine, ledger)
    }

    #[test]
    fn escrow_round_trip_matches_worked_example() {
        let (engine, ledger) = temp_engine("escrow_round_trip_matches_worked_example");
        let a = MemberId::from_bytes([1u8; 32]);
        let b = MemberId::from_bytes([2u8; 32]);
        ledger.add_member(a, Some(100), 0).unwrap();
        ledger.add_member(b, Some(100), 0).unwrap();

        let id = CommitmentId::from_bytes([9u8; 16]);
        engine
            .create_commitment(
                id,
                CommitmentKind::Escrowed,
                a,
                b,
                50,
                Category::Labor,
                "childcare swap",
                None,
                0,
            )
            .unwrap();
        engine.accept_commitment(&id, b, 1).unwrap();
        assert_eq!(ledger.member(&a).unwrap().reserve, 50);
        assert_eq!(ledger.member(&a).unwrap().available_capacity(), 50);

        engine.cancel_commitment(&id, a, "changed plans", 2).unwrap();
        assert_eq!(ledger.member(&a).unwrap().reserve, 0);

        let id2 = CommitmentId::from_bytes([10u8; 16]);
        engine
            .create_commitment(
                id2,
                CommitmentKind::Escrowed,
                a,
                b,
                50,
                Category::Labor,
                "childcare swap, take two",
                None,
                3,
            )
            .unwrap();
        engine.accept_commitment(&id2, b, 4).unwrap();
        engine
            .fulfill_commitment(
                &id2,
                FulfilmentConfirmation {
                    confirmed_by: b,
                    rating: Some(5),
                    notes: None,
                },
                5,
            )
            .unwrap();

        assert_eq!(ledger.member(&a).unwrap().balance, -50);
        assert_eq!(ledger.member(&b).unwrap().balance, 50);
        assert_eq!(ledger.member(&a).unwrap().reserve, 0);
        assert_eq!(ledger.member(&b).unwrap().reserve, 0);
    }

    #[test]
    fn only_promisee_may_fulfill() {
        let (engine, ledger) = temp_engine("only_promisee_may_fulfill");
        let a = MemberId::from_bytes([3u8; 32]);
        let b = MemberId::from_bytes([4u8; 32]);
        ledger.add_member(a, Some(100), 0).unwrap();
        ledger.add_member(b, Some(100), 0).unwrap();
        let id = CommitmentId::from_bytes([11u8; 16]);
        engine
            .create_commitment(id, CommitmentKind::Soft, a, b, 10, Category::Food, "meal", None, 0)
            .unwrap();
        engine.accept_commitment(&id, b, 1).unwrap();
        let err = engine
            .fulfill_commitment(
                &id,
                FulfilmentConfirmation {
                    confirmed_by: a,
                    rating: None,
                    notes: None,
                },
                2,
            )
            .unwrap_err();
        assert!(matches!(err, CommitmentsError::NotPromisee));
    }

    #[test]
    fn insufficient_capacity_rejected_at_creation() {
        let (engine, ledger) = temp_engine("insufficient_capacity_rejected_at_creation");
        let a = MemberId::from_bytes([5u8; 32]);
        let b = MemberId::from_bytes([6u8; 32]);
        ledger.add_member(a, Some(10), 0).unwrap();
        ledger.add_member(b, Some(10), 0).unwrap();
        let id = CommitmentId::from_bytes([12u8; 16]);
        let err = engine
            .create_commitment(
                id,
                CommitmentKind::Escrowed,
                a,
                b,
                50,
                Category::Repair,
                "roof",
                None,
                0,
            )
            .unwrap_err();
        assert!(matches!(err, CommitmentsError::InsufficientCapacity(_)));
    }

    #[test]
    fn dispute_then_resolve_cancel_releases_reserve() {
        let (engine, ledger) = temp_engine("dispute_then_resolve_cancel_releases_reserve");
        let a = MemberId::from_bytes([7u8; 32]);
        let b = MemberId::from_bytes([8u8; 32]);
        ledger.add_member(a, Some(100), 0).unwrap();
        ledger.add_member(b, Some(100), 0).unwrap();
        let id = CommitmentId::from_bytes([13u8; 16]);
        engine
            .create_commitment(
                id,
                CommitmentKind::Escrowed,
                a,
                b,
                30,
                Category::Transport,
                "ride",
                None,
                0,
            )
            .unwrap();
        engine.accept_commitment(&id, b, 1).unwrap();
        engine.dispute_commitment(&id, "never showed up", 2).unwrap();
        engine.resolve_dispute(&id, a, None, false, 3).unwrap();
        assert_eq!(ledger.member(&a).unwrap().reserve, 0);
    }
}
