use std::path::Path;
use std::sync::Mutex;

use concord_core::constants::FLOOR_MASS_RHO;
use concord_core::{Balance, CellId, CellParameters, Member, MemberId, MemberStatus, SequenceNumber, Timestamp};

use crate::db::{CellMeta, LedgerDb, LedgerEvent, LedgerEventType};
use crate::error::LedgerError;
use crate::types::{BalanceUpdate, ReserveUpdate, Statistics};

/// The authoritative per-cell member ledger (§4.1).
///
/// Every mutating method acquires `guard` for its entire body and releases
/// it before returning — the single logical critical section of §5. The
/// observable contract is strict serializability of mutations; callers may
/// hold `Ledger` behind an `Arc` and call it from multiple threads.
pub struct Ledger {
    db: LedgerDb,
    cell_id: CellId,
    guard: Mutex<()>,
}

impl Ledger {
    /// Open (or initialize) the ledger for `cell_id` at `path`. If no cell
    /// metadata exists yet, seeds it with `parameters` and sequence number 0.
    pub fn open(
        path: impl AsRef<Path>,
        cell_id: CellId,
        parameters: CellParameters,
        now: Timestamp,
    ) -> Result<Self, LedgerError> {
        let db = LedgerDb::open(path)?;
        if db.get_cell_meta(&cell_id)?.is_none() {
            db.put_cell_meta(&CellMeta {
                cell_id,
                parameters,
                sequence_number: 0,
                last_updated: now,
            })?;
        }
        Ok(Self {
            db,
            cell_id,
            guard: Mutex::new(()),
        })
    }

    pub fn cell_id(&self) -> CellId {
        self.cell_id
    }

    fn cell_meta(&self) -> Result<CellMeta, LedgerError> {
        self.db
            .get_cell_meta(&self.cell_id)?
            .ok_or(LedgerError::CellNotFound(self.cell_id))
    }

    fn next_sequence(&self, meta: &CellMeta, now: Timestamp) -> Result<SequenceNumber, LedgerError> {
        let seq = meta.sequence_number + 1;
        self.db.put_cell_meta(&CellMeta {
            sequence_number: seq,
            last_updated: now,
            ..meta.clone()
        })?;
        Ok(seq)
    }

    fn commit_event(
        &self,
        meta: &CellMeta,
        event_type: LedgerEventType,
        now: Timestamp,
    ) -> Result<SequenceNumber, LedgerError> {
        let seq = self.next_sequence(meta, now)?;
        self.db.append_event(&LedgerEvent {
            cell_id: self.cell_id,
            event_type,
            sequence_number: seq,
            timestamp: now,
        })?;
        Ok(seq)
    }

    fn get_member(&self, id: &MemberId) -> Result<Member, LedgerError> {
        self.db
            .get_member(id)?
            .ok_or(LedgerError::MemberNotFound(*id))
    }

    /// `add_member(id, initial_limit=default)` — creates an Active entry
    /// with balance=reserve=0 and the requested limit clamped to
    /// `[min_limit, max_limit]`. Fails if `id` exists.
    pub fn add_member(
        &self,
        id: MemberId,
        initial_limit: Option<Balance>,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        let _lock = self.guard.lock().unwrap();
        if self.db.get_member(&id)?.is_some() {
            return Err(LedgerError::MemberAlreadyExists(id));
        }
        let meta = self.cell_meta()?;
        let limit = meta
            .parameters
            .clamp_limit(initial_limit.unwrap_or(meta.parameters.default_limit));
        let member = Member::new(id, limit, now);
        self.db.put_member(&member)?;
        self.commit_event(&meta, LedgerEventType::MemberAdded { member: id, limit }, now)?;
        tracing::info!(member = %id, limit, "member added");
        Ok(())
    }

    /// `remove_member(id)` — removes only when balance = 0, reserve = 0, and
    /// `active_commitment_count = 0`. The Ledger does not track commitments
    /// itself (§3 "Lifecycle & ownership"); the caller — typically the
    /// Commitments engine's own removal guard — supplies that count.
    pub fn remove_member(
        &self,
        id: MemberId,
        active_commitment_count: u32,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        let _lock = self.guard.lock().unwrap();
        let member = self.get_member(&id)?;
        if member.balance != 0 || member.reserve != 0 || active_commitment_count > 0 {
            return Err(LedgerError::NonZeroBalance(id));
        }
        self.db.delete_member(&id)?;
        let meta = self.cell_meta()?;
        self.commit_event(&meta, LedgerEventType::MemberRemoved { member: id }, now)?;
        tracing::info!(member = %id, "member removed");
        Ok(())
    }

    /// `can_spend(id, amount)` — true iff the member is Active and
    /// `balance - reserve - amount >= -limit`.
    pub fn can_spend(&self, id: &MemberId, amount: Balance) -> Result<bool, LedgerError> {
        let member = self.get_member(id)?;
        Ok(member.can_spend(amount))
    }

    /// `available_capacity(id) = limit + balance - reserve`.
    pub fn available_capacity(&self, id: &MemberId) -> Result<Balance, LedgerError> {
        let member = self.get_member(id)?;
        Ok(member.available_capacity())
    }

    pub fn member(&self, id: &MemberId) -> Result<Member, LedgerError> {
        self.get_member(id)
    }

    /// `apply_balance_updates` — atomic: succeeds only if the deltas sum to
    /// zero and every resulting member satisfies I2 (and I4 when
    /// `enforce_escrow_safety`), with I3 preserved throughout. On failure, no
    /// change is made to any member.
    ///
    /// Deltas are validated against a snapshot of every affected member
    /// before any write lands in storage (the staged-mutation pattern): the
    /// whole batch is checked, then every entry is written, so a single
    /// rejecting member aborts the entire call with zero partial state.
    pub fn apply_balance_updates(
        &self,
        updates: &[BalanceUpdate],
        now: Timestamp,
    ) -> Result<SequenceNumber, LedgerError> {
        let _lock = self.guard.lock().unwrap();
        if updates.is_empty() {
            return Err(LedgerError::InvalidAmount("empty update list".into()));
        }
        let sum: Balance = updates.iter().map(|u| u.delta).sum();
        if sum != 0 {
            return Err(LedgerError::ConservationViolation);
        }

        let meta = self.cell_meta()?;
        let mut staged = Vec::with_capacity(updates.len());
        for update in updates {
            let mut member = self.get_member(&update.member)?;
            member.balance += update.delta;
            member.last_activity = now;
            if !member.satisfies_floor() {
                return Err(LedgerError::FloorViolation {
                    member: member.id,
                    balance: member.balance,
                    limit: member.limit,
                });
            }
            if !member.satisfies_reserve_nonnegative() {
                return Err(LedgerError::NegativeReserve(member.id));
            }
            if meta.parameters.enforce_escrow_safety && !member.satisfies_escrow_safety() {
                return Err(LedgerError::EscrowViolation(member.id));
            }
            staged.push(member);
        }

        for member in &staged {
            self.db.put_member(member)?;
        }

        let deltas = updates.iter().map(|u| (u.member, u.delta)).collect();
        let reason = updates
            .first()
            .map(|u| u.reason.clone())
            .unwrap_or_default();
        let seq = self.commit_event(
            &meta,
            LedgerEventType::BalancesUpdated { deltas, reason },
            now,
        )?;
        tracing::info!(sequence_number = seq, member_count = staged.len(), "applied balance update");
        Ok(seq)
    }

    /// `apply_reserve_update` — adjusts `reserve` atomically, preserving I3
    /// and (when enforced) I4.
    pub fn apply_reserve_update(
        &self,
        update: ReserveUpdate,
        now: Timestamp,
    ) -> Result<SequenceNumber, LedgerError> {
        let _lock = self.guard.lock().unwrap();
        let meta = self.cell_meta()?;
        let mut member = self.get_member(&update.member)?;
        member.reserve += update.delta;
        member.last_activity = now;
        if !member.satisfies_reserve_nonnegative() {
            return Err(LedgerError::NegativeReserve(member.id));
        }
        if meta.parameters.enforce_escrow_safety && !member.satisfies_escrow_safety() {
            return Err(LedgerError::EscrowViolation(member.id));
        }
        self.db.put_member(&member)?;
        let seq = self.commit_event(
            &meta,
            LedgerEventType::ReserveUpdated {
                member: update.member,
                delta: update.delta,
                reason: update.reason,
            },
            now,
        )?;
        tracing::info!(sequence_number = seq, member = %update.member, "applied reserve update");
        Ok(seq)
    }

    /// `apply_settlement` — releases (or otherwise adjusts) one reserve and
    /// moves a conservation-preserving batch of balances in a single atomic
    /// call, validating every touched member's combined effect before
    /// writing anything. Built for commitment fulfilment (§4.3): the
    /// reserve release and the payment settlement must land together or not
    /// at all, so a promisee whose balance leg would breach I2/I4 rejects
    /// the whole call — the promisor's reserve stays intact rather than
    /// being freed out from under a commitment that remains Active.
    ///
    /// A member named by both the reserve update and a balance update (the
    /// promisor, in the fulfilment case) is validated once against the
    /// combined delta, not once per leg against an inconsistent
    /// in-between state.
    pub fn apply_settlement(
        &self,
        reserve_update: ReserveUpdate,
        balance_updates: &[BalanceUpdate],
        now: Timestamp,
    ) -> Result<SequenceNumber, LedgerError> {
        let _lock = self.guard.lock().unwrap();
        if balance_updates.is_empty() {
            return Err(LedgerError::InvalidAmount("empty update list".into()));
        }
        let sum: Balance = balance_updates.iter().map(|u| u.delta).sum();
        if sum != 0 {
            return Err(LedgerError::ConservationViolation);
        }

        let meta = self.cell_meta()?;
        let mut touched = vec![reserve_update.member];
        for update in balance_updates {
            if !touched.contains(&update.member) {
                touched.push(update.member);
            }
        }

        let mut staged = Vec::with_capacity(touched.len());
        for id in &touched {
            let mut member = self.get_member(id)?;
            if *id == reserve_update.member {
                member.reserve += reserve_update.delta;
            }
            for update in balance_updates.iter().filter(|u| u.member == *id) {
                member.balance += update.delta;
            }
            member.last_activity = now;
            if !member.satisfies_floor() {
                return Err(LedgerError::FloorViolation {
                    member: member.id,
                    balance: member.balance,
                    limit: member.limit,
                });
            }
            if !member.satisfies_reserve_nonnegative() {
                return Err(LedgerError::NegativeReserve(member.id));
            }
            if meta.parameters.enforce_escrow_safety && !member.satisfies_escrow_safety() {
                return Err(LedgerError::EscrowViolation(member.id));
            }
            staged.push(member);
        }

        for member in &staged {
            self.db.put_member(member)?;
        }

        let deltas = balance_updates.iter().map(|u| (u.member, u.delta)).collect();
        let reason = balance_updates
            .first()
            .map(|u| u.reason.clone())
            .unwrap_or_default();
        let seq = self.commit_event(
            &meta,
            LedgerEventType::SettlementApplied {
                reserve_member: reserve_update.member,
                reserve_delta: reserve_update.delta,
                deltas,
                reason,
            },
            now,
        )?;
        tracing::info!(sequence_number = seq, member_count = staged.len(), "applied settlement");
        Ok(seq)
    }

    /// `update_member_limit(id, new_limit)` — clamps to `[min_limit,
    /// max_limit]`. Lowering a limit below the current `-balance` is
    /// permitted: the floor is evaluated on future mutations, not
    /// retroactively enforced as a violation.
    pub fn update_member_limit(
        &self,
        id: MemberId,
        new_limit: Balance,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        let _lock = self.guard.lock().unwrap();
        let meta = self.cell_meta()?;
        let mut member = self.get_member(&id)?;
        member.limit = meta.parameters.clamp_limit(new_limit);
        self.db.put_member(&member)?;
        self.commit_event(
            &meta,
            LedgerEventType::LimitUpdated {
                member: id,
                new_limit: member.limit,
            },
            now,
        )?;
        Ok(())
    }

    /// `update_member_status(id, status)`. The core has no opinion on which
    /// status transitions are "legal" beyond what `MemberStatus::
    /// can_transact` gates for new mutations — admission policy (who may
    /// move a member to Probation, Frozen, or Excluded, and when) belongs to
    /// the Governance collaborator, which is expected to authorize the call
    /// before it reaches the Ledger. Existing reserves and balances are
    /// preserved across any transition.
    pub fn update_member_status(
        &self,
        id: MemberId,
        status: MemberStatus,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        let _lock = self.guard.lock().unwrap();
        let meta = self.cell_meta()?;
        let mut member = self.get_member(&id)?;
        member.status = status;
        self.db.put_member(&member)?;
        self.commit_event(&meta, LedgerEventType::StatusUpdated { member: id, status }, now)?;
        Ok(())
    }

    /// `statistics()` (§4.1). `aggregate_capacity` sums `limit` over every
    /// member tracked here, including any reserved clearing-account entry —
    /// the Ledger has no notion of "clearing account"; Federation excludes
    /// it when computing Λ for the exposure cap (§4.4).
    pub fn statistics(&self) -> Result<Statistics, LedgerError> {
        let members = self.db.iter_members()?;
        let mut stats = Statistics {
            member_count: members.len(),
            ..Statistics::default()
        };
        let mut balances = Vec::with_capacity(members.len());
        for member in &members {
            if member.status.can_transact() {
                stats.active_member_count += 1;
            }
            stats.aggregate_capacity += member.limit;
            stats.total_reserved += member.reserve;
            stats.balance_sum += member.balance;
            if member.balance > 0 {
                stats.positive_sum += member.balance;
            } else if member.balance < 0 {
                stats.negative_sum += member.balance;
            }
            if member.contributes_to_floor_mass(FLOOR_MASS_RHO) {
                stats.floor_mass += member.limit;
            }
            balances.push(member.balance as f64);
        }
        stats.balance_variance = variance(&balances);
        Ok(stats)
    }

    /// I1: the conservation invariant over every member this ledger tracks.
    pub fn verify_conservation(&self) -> Result<bool, LedgerError> {
        Ok(self.statistics()?.balance_sum == 0)
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush()
    }

    /// Exposed for the Hardening harness and federation crates that need to
    /// read every member without going through `statistics()`.
    pub fn all_members(&self) -> Result<Vec<Member>, LedgerError> {
        self.db.iter_members()
    }

    /// Exposed for the event-log replay property (§8).
    pub fn events(&self) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.db.iter_events()
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ledger(name: &str) -> Ledger {
        let dir = std::env::temp_dir().join(format!("concord_ledger_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        Ledger::open(&dir, CellId::from_bytes([1u8; 32]), CellParameters::default(), 0)
            .expect("open temp ledger")
    }

    fn member_id(byte: u8) -> MemberId {
        MemberId::from_bytes([byte; 32])
    }

    #[test]
    fn add_member_clamps_limit() {
        let ledger = temp_ledger("add_member_clamps_limit");
        ledger.add_member(member_id(2), Some(10_000_000), 0).unwrap();
        let member = ledger.member(&member_id(2)).unwrap();
        assert_eq!(member.limit, CellParameters::default().max_limit);
    }

    #[test]
    fn add_member_duplicate_rejected() {
        let ledger = temp_ledger("add_member_duplicate_rejected");
        ledger.add_member(member_id(3), None, 0).unwrap();
        let err = ledger.add_member(member_id(3), None, 0).unwrap_err();
        assert!(matches!(err, LedgerError::MemberAlreadyExists(_)));
    }

    #[test]
    fn transfer_preserves_conservation() {
        let ledger = temp_ledger("transfer_preserves_conservation");
        ledger.add_member(member_id(4), Some(100), 0).unwrap();
        ledger.add_member(member_id(5), Some(100), 0).unwrap();
        ledger
            .apply_balance_updates(
                &[
                    BalanceUpdate::new(member_id(4), -30, "spot transfer"),
                    BalanceUpdate::new(member_id(5), 30, "spot transfer"),
                ],
                1,
            )
            .unwrap();
        assert!(ledger.verify_conservation().unwrap());
        assert_eq!(ledger.member(&member_id(4)).unwrap().balance, -30);
        assert_eq!(ledger.member(&member_id(5)).unwrap().balance, 30);
    }

    #[test]
    fn unbalanced_deltas_rejected_with_no_partial_mutation() {
        let ledger = temp_ledger("unbalanced_deltas_rejected_with_no_partial_mutation");
        ledger.add_member(member_id(6), Some(100), 0).unwrap();
        ledger.add_member(member_id(7), Some(100), 0).unwrap();
        let err = ledger
            .apply_balance_updates(
                &[
                    BalanceUpdate::new(member_id(6), -30, "bad"),
                    BalanceUpdate::new(member_id(7), 29, "bad"),
                ],
                1,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::ConservationViolation));
        assert_eq!(ledger.member(&member_id(6)).unwrap().balance, 0);
        assert_eq!(ledger.member(&member_id(7)).unwrap().balance, 0);
    }

    #[test]
    fn floor_violation_rejected() {
        let ledger = temp_ledger("floor_violation_rejected");
        ledger.add_member(member_id(8), Some(50), 0).unwrap();
        ledger.add_member(member_id(9), Some(50), 0).unwrap();
        let err = ledger
            .apply_balance_updates(
                &[
                    BalanceUpdate::new(member_id(8), -51, "over the floor"),
                    BalanceUpdate::new(member_id(9), 51, "over the floor"),
                ],
                1,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::FloorViolation { .. }));
    }

    #[test]
    fn spend_at_exactly_available_capacity_succeeds_one_more_fails() {
        let ledger = temp_ledger("spend_at_exactly_available_capacity_succeeds_one_more_fails");
        ledger.add_member(member_id(10), Some(100), 0).unwrap();
        ledger.add_member(member_id(11), Some(100), 0).unwrap();
        let capacity = ledger.available_capacity(&member_id(10)).unwrap();
        ledger
            .apply_balance_updates(
                &[
                    BalanceUpdate::new(member_id(10), -capacity, "boundary"),
                    BalanceUpdate::new(member_id(11), capacity, "boundary"),
                ],
                1,
            )
            .unwrap();

        let ledger2 = temp_ledger("spend_at_exactly_available_capacity_succeeds_one_more_fails_2");
        ledger2.add_member(member_id(10), Some(100), 0).unwrap();
        ledger2.add_member(member_id(11), Some(100), 0).unwrap();
        let capacity = ledger2.available_capacity(&member_id(10)).unwrap();
        let err = ledger2
            .apply_balance_updates(
                &[
                    BalanceUpdate::new(member_id(10), -(capacity + 1), "boundary+1"),
                    BalanceUpdate::new(member_id(11), capacity + 1, "boundary+1"),
                ],
                1,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::FloorViolation { .. }));
    }

    #[test]
    fn remove_member_with_nonzero_balance_fails() {
        let ledger = temp_ledger("remove_member_with_nonzero_balance_fails");
        ledger.add_member(member_id(12), Some(100), 0).unwrap();
        ledger.add_member(member_id(13), Some(100), 0).unwrap();
        ledger
            .apply_balance_updates(
                &[
                    BalanceUpdate::new(member_id(12), -10, "x"),
                    BalanceUpdate::new(member_id(13), 10, "x"),
                ],
                1,
            )
            .unwrap();
        let err = ledger.remove_member(member_id(12), 0, 2).unwrap_err();
        assert!(matches!(err, LedgerError::NonZeroBalance(_)));
    }

    #[test]
    fn reserve_update_respects_escrow_safety() {
        let ledger = temp_ledger("reserve_update_respects_escrow_safety");
        ledger.add_member(member_id(14), Some(100), 0).unwrap();
        ledger
            .apply_reserve_update(ReserveUpdate::new(member_id(14), 100, "escrow"), 1)
            .unwrap();
        let err = ledger
            .apply_reserve_update(ReserveUpdate::new(member_id(14), 1, "over"), 2)
            .unwrap_err();
        assert!(matches!(err, LedgerError::EscrowViolation(_)));
    }

    #[test]
    fn limit_reduction_below_current_negative_balance_is_accepted() {
        let ledger = temp_ledger("limit_reduction_below_current_negative_balance_is_accepted");
        ledger.add_member(member_id(15), Some(100), 0).unwrap();
        ledger.add_member(member_id(16), Some(100), 0).unwrap();
        ledger
            .apply_balance_updates(
                &[
                    BalanceUpdate::new(member_id(15), -80, "spend"),
                    BalanceUpdate::new(member_id(16), 80, "spend"),
                ],
                1,
            )
            .unwrap();
        ledger.update_member_limit(member_id(15), 50, 2).unwrap();
        let err = ledger
            .apply_balance_updates(
                &[
                    BalanceUpdate::new(member_id(15), -1, "blocked by new floor"),
                    BalanceUpdate::new(member_id(16), 1, "blocked by new floor"),
                ],
                3,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::FloorViolation { .. }));
    }

    #[test]
    fn event_log_sequence_is_monotonic() {
        let ledger = temp_ledger("event_log_sequence_is_monotonic");
        ledger.add_member(member_id(17), None, 0).unwrap();
        ledger.add_member(member_id(18), None, 0).unwrap();
        ledger
            .apply_balance_updates(
                &[
                    BalanceUpdate::new(member_id(17), -1, "x"),
                    BalanceUpdate::new(member_id(18), 1, "x"),
                ],
                1,
            )
            .unwrap();
        let events = ledger.events().unwrap();
        let seqs: Vec<_> = events.iter().map(|e| e.sequence_number).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
        assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));
    }
}
