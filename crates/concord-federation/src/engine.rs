use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use concord_core::collaborators::{RemoteTransferOutcome, RemoteTransferRequest};
use concord_core::constants::{FEDERATION_BASE_BETA_MAX, FEDERATION_BASE_BETA_MIN, MAX_SYNC_DELAY_MS};
use concord_core::{Balance, CellId, FederationTransport, MemberId, Timestamp};
use concord_ledger::{BalanceUpdate, Ledger};

use crate::db::FederationDb;
use crate::error::FederationError;
use crate::types::{BilateralLink, FederationTx, FederationTxId, FederationTxStatus, LinkStatus};

/// One cell's federation engine (§4.4): clearing-account bookkeeping,
/// bilateral links, exposure-cap enforcement, and the two-phase inter-cell
/// transfer protocol with compensating rollback.
pub struct FederationEngine {
    db: FederationDb,
    ledger: Arc<Ledger>,
    cell_id: CellId,
    clearing_account: MemberId,
    base_beta: f64,
    guard: Mutex<()>,
}

impl FederationEngine {
    pub fn open(
        path: impl AsRef<Path>,
        ledger: Arc<Ledger>,
        cell_id: CellId,
        base_beta: f64,
    ) -> Result<Self, FederationError> {
        let db = FederationDb::open(path)?;
        let clearing_account = MemberId::clearing_account_for(&cell_id);
        Ok(Self {
            db,
            ledger,
            cell_id,
            clearing_account,
            base_beta: base_beta.clamp(FEDERATION_BASE_BETA_MIN, FEDERATION_BASE_BETA_MAX),
            guard: Mutex::new(()),
        })
    }

    pub fn clearing_account(&self) -> MemberId {
        self.clearing_account
    }

    /// `cap_k = beta_k * Lambda_k`, Lambda excluding the clearing account's
    /// own limit (§4.4).
    pub fn exposure_cap(&self) -> Result<Balance, FederationError> {
        let stats = self.ledger.statistics()?;
        let clearing = self.ledger.member(&self.clearing_account)?;
        let lambda = stats.aggregate_capacity - clearing.limit;
        let meta = self.db.get_meta()?;
        let beta = self.base_beta * meta.beta_factor;
        Ok(((lambda as f64) * beta) as Balance)
    }

    /// `B_k`, this cell's aggregate net external claim — the sum of every
    /// link's position. `balance(X_k) = -B_k` is maintained by construction:
    /// every transfer updates both the clearing account balance and the
    /// relevant link's position by the same amount in opposite senses.
    pub fn aggregate_position(&self) -> Result<Balance, FederationError> {
        Ok(self.db.iter_links()?.iter().map(|l| l.position).sum())
    }

    pub fn is_quarantined(&self) -> Result<bool, FederationError> {
        Ok(self.db.get_meta()?.quarantined)
    }

    pub fn quarantine(&self, reason: impl Into<String>) -> Result<(), FederationError> {
        let mut meta = self.db.get_meta()?;
        meta.quarantined = true;
        meta.quarantine_reason = Some(reason.into());
        self.db.put_meta(&meta)?;
        tracing::info!(cell = %self.cell_id, "cell quarantined");
        Ok(())
    }

    pub fn resume(&self) -> Result<(), FederationError> {
        let mut meta = self.db.get_meta()?;
        meta.quarantined = false;
        meta.quarantine_reason = None;
        self.db.put_meta(&meta)?;
        Ok(())
    }

    /// Emergency pushes its `federation_beta_factor` here; Panic sets it to
    /// `0.0`, freezing federation entirely (`cap` collapses to zero). A
    /// reduction that shrinks the cap below an already-open aggregate
    /// position is a real exposure-exceeds-cap condition — unlike a single
    /// rejected transfer attempt, the cell is now holding more exposure
    /// than its own policy allows — so that case quarantines the cell.
    pub fn set_beta_factor(&self, factor: f64) -> Result<(), FederationError> {
        let mut meta = self.db.get_meta()?;
        meta.beta_factor = factor;
        self.db.put_meta(&meta)?;

        let position = self.aggregate_position()?;
        let cap = self.exposure_cap()?;
        if position.unsigned_abs() > cap.unsigned_abs() {
            self.quarantine(format!(
                "beta factor set to {factor}: cap {cap} below open position {position}"
            ))?;
        }
        Ok(())
    }

    fn link(&self, remote: &CellId) -> Result<BilateralLink, FederationError> {
        self.db
            .get_link(remote)?
            .ok_or(FederationError::LinkNotFound(*remote))
    }

    /// `propose_link` — creates a Pending link to `remote` if none exists.
    pub fn propose_link(&self, remote: CellId, now: Timestamp) -> Result<(), FederationError> {
        if self.db.get_link(&remote)?.is_some() {
            return Err(FederationError::LinkAlreadyExists(remote));
        }
        self.db.put_link(&BilateralLink {
            remote_cell: remote,
            status: LinkStatus::Pending,
            position: 0,
            established_at: now,
        })?;
        Ok(())
    }

    /// `accept_link` — Pending → Active.
    pub fn accept_link(&self, remote: &CellId) -> Result<(), FederationError> {
        let mut link = self.link(remote)?;
        link.status = LinkStatus::Active;
        self.db.put_link(&link)?;
        Ok(())
    }

    pub fn suspend_link(&self, remote: &CellId) -> Result<(), FederationError> {
        let mut link = self.link(remote)?;
        link.status = LinkStatus::Suspended;
        self.db.put_link(&link)?;
        Ok(())
    }

    pub fn resume_link(&self, remote: &CellId) -> Result<(), FederationError> {
        let mut link = self.link(remote)?;
        link.status = LinkStatus::Active;
        self.db.put_link(&link)?;
        Ok(())
    }

    /// Net flow with `remote` since the link was established.
    pub fn bilateral_position(&self, remote: &CellId) -> Result<Balance, FederationError> {
        Ok(self.link(remote)?.position)
    }

    fn require_active_link(&self, remote: &CellId) -> Result<(), FederationError> {
        if self.db.get_meta()?.quarantined {
            return Err(FederationError::Quarantined);
        }
        let link = self.link(remote)?;
        if link.status != LinkStatus::Active {
            return Err(FederationError::LinkNotActive(*remote));
        }
        Ok(())
    }

    /// `cap` is a whole-cell aggregate, not per-counterparty — `amount` is
    /// the signed delta the pending transfer would apply to `B_k`.
    fn check_cap(&self, amount: Balance) -> Result<(), FederationError> {
        let position = self.aggregate_position()?;
        let projected = position - amount;
        let cap = self.exposure_cap()?;
        if projected.abs() > cap {
            if self.db.get_meta()?.beta_factor == 0.0 {
                return Err(FederationError::FederationFrozen);
            }
            return Err(FederationError::CapExceeded {
                position,
                sign: "-",
                amount,
                cap,
            });
        }
        Ok(())
    }

    /// The source side of step 1: local validation before any remote call.
    fn validate_source(
        &self,
        payer: &MemberId,
        target: &CellId,
        amount: Balance,
    ) -> Result<(), FederationError> {
        if !self.ledger.member(payer)?.status.can_transact() {
            return Err(FederationError::MemberNotActive(*payer));
        }
        if !self.ledger.can_spend(payer, amount)? {
            return Err(FederationError::Ledger(
                concord_ledger::LedgerError::FloorViolation {
                    member: *payer,
                    balance: self.ledger.member(payer)?.balance,
                    limit: self.ledger.member(payer)?.limit,
                },
            ));
        }
        self.require_active_link(target)?;
        self.check_cap(amount)?;
        Ok(())
    }

    /// Drives the full inter-cell transfer protocol (§4.4 steps 1-5) from
    /// the source side: source-local validation, the target-remote round
    /// trip via `transport`, the source leg, the target-leg request, and —
    /// on target failure after the source leg landed — compensating
    /// rollback of the source leg.
    pub async fn initiate_transfer(
        &self,
        id: FederationTxId,
        target_cell: CellId,
        payer: MemberId,
        payee: MemberId,
        amount: Balance,
        transport: &dyn FederationTransport,
        now: Timestamp,
    ) -> Result<FederationTxStatus, FederationError> {
        let _lock = self.guard.lock().unwrap();

        if let Some(existing) = self.db.get_tx(&id)? {
            return Ok(existing.status);
        }

        self.validate_source(&payer, &target_cell, amount)?;

        let request = RemoteTransferRequest {
            tx_id: id,
            source_cell: self.cell_id,
            target_cell,
            payee,
            amount,
            payload: Vec::new(),
        };

        let mut tx = FederationTx {
            id,
            source_cell: self.cell_id,
            target_cell,
            payer,
            payee,
            amount,
            status: FederationTxStatus::Pending,
            reason: None,
            created_at: now,
        };
        self.db.put_tx(&tx)?;

        let validate_outcome = self.await_transport(transport.validate_remote(&request)).await;
        let validate_outcome = match validate_outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                tx.status = FederationTxStatus::Rejected;
                tx.reason = Some(err.to_string());
                self.db.put_tx(&tx)?;
                return Err(err);
            }
        };
        if let RemoteTransferOutcome::Rejected { reason } = validate_outcome {
            tx.status = FederationTxStatus::Rejected;
            tx.reason = Some(reason.clone());
            self.db.put_tx(&tx)?;
            return Err(FederationError::TargetRejected(id, reason));
        }

        // Step 3: source leg.
        self.ledger.apply_balance_updates(
            &[
                BalanceUpdate::new(payer, -amount, "federation transfer"),
                BalanceUpdate::new(self.clearing_account, amount, "federation transfer"),
            ],
            now,
        )?;
        self.adjust_position(&target_cell, -amount)?;

        // Step 4: target leg.
        let execute_outcome = self.await_transport(transport.execute_remote(&request)).await;
        match execute_outcome {
            Ok(RemoteTransferOutcome::Accepted) => {
                tx.status = FederationTxStatus::Completed;
                self.db.put_tx(&tx)?;
                tracing::info!(tx = %id, "federation transfer completed");
                Ok(FederationTxStatus::Completed)
            }
            Ok(RemoteTransferOutcome::Rejected { reason }) => {
                self.rollback_source_leg(&tx, &reason, now)?;
                self.rollback_remote_best_effort(transport, &id).await;
                Ok(FederationTxStatus::RolledBack)
            }
            Err(err) => {
                self.rollback_source_leg(&tx, &err.to_string(), now)?;
                self.rollback_remote_best_effort(transport, &id).await;
                Ok(FederationTxStatus::RolledBack)
            }
        }
    }

    fn rollback_source_leg(
        &self,
        tx: &FederationTx,
        reason: &str,
        now: Timestamp,
    ) -> Result<(), FederationError> {
        self.ledger.apply_balance_updates(
            &[
                BalanceUpdate::new(tx.payer, tx.amount, "federation transfer rollback"),
                BalanceUpdate::new(self.clearing_account, -tx.amount, "federation transfer rollback"),
            ],
            now,
        )?;
        self.adjust_position(&tx.target_cell, tx.amount)?;
        let mut tx = tx.clone();
        tx.status = FederationTxStatus::RolledBack;
        tx.reason = Some(reason.to_string());
        self.db.put_tx(&tx)?;
        tracing::info!(tx = %tx.id, "federation transfer rolled back");
        Ok(())
    }

    async fn rollback_remote_best_effort(&self, transport: &dyn FederationTransport, id: &FederationTxId) {
        let _ = self.await_transport(transport.rollback_remote(id)).await;
    }

    async fn await_transport<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, concord_core::CoreError>>,
    ) -> Result<T, FederationError> {
        match tokio::time::timeout(Duration::from_millis(MAX_SYNC_DELAY_MS as u64), fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(FederationError::Core(err)),
            Err(_) => Err(FederationError::Storage("federation transport timed out".into())),
        }
    }

    fn adjust_position(&self, remote: &CellId, delta: Balance) -> Result<(), FederationError> {
        let mut link = self.link(remote)?;
        link.position += delta;
        self.db.put_link(&link)?;
        Ok(())
    }

    /// The target side of step 2: validates an incoming remote transfer
    /// request without mutating any state.
    pub fn receive_validate(&self, request: &RemoteTransferRequest) -> RemoteTransferOutcome {
        if let Some(existing) = self.db.get_tx(&request.tx_id).ok().flatten() {
            return match existing.status {
                FederationTxStatus::Completed => RemoteTransferOutcome::Accepted,
                _ => RemoteTransferOutcome::Rejected {
                    reason: "duplicate transfer id previously rejected or rolled back".into(),
                },
            };
        }
        match self.validate_target(request) {
            Ok(()) => RemoteTransferOutcome::Accepted,
            Err(err) => RemoteTransferOutcome::Rejected {
                reason: err.to_string(),
            },
        }
    }

    fn validate_target(&self, request: &RemoteTransferRequest) -> Result<(), FederationError> {
        if !self.ledger.member(&request.payee)?.status.can_transact() {
            return Err(FederationError::MemberNotActive(request.payee));
        }
        self.require_active_link(&request.source_cell)?;
        self.check_cap(-request.amount)?;
        Ok(())
    }

    /// The target side of step 4: applies the target leg. Idempotent by
    /// `tx_id` — a duplicate request for an already-`Completed` transfer
    /// returns the prior outcome without re-applying the balance update.
    pub fn receive_execute(&self, request: &RemoteTransferRequest, now: Timestamp) -> RemoteTransferOutcome {
        let _lock = self.guard.lock().unwrap();
        if let Some(existing) = self.db.get_tx(&request.tx_id).ok().flatten() {
            if existing.status == FederationTxStatus::Completed {
                return RemoteTransferOutcome::Accepted;
            }
        }
        match self.apply_target_leg(request, now) {
            Ok(()) => RemoteTransferOutcome::Accepted,
            Err(err) => RemoteTransferOutcome::Rejected {
                reason: err.to_string(),
            },
        }
    }

    fn apply_target_leg(&self, request: &RemoteTransferRequest, now: Timestamp) -> Result<(), FederationError> {
        self.validate_target(request)?;
        self.ledger.apply_balance_updates(
            &[
                BalanceUpdate::new(self.clearing_account, -request.amount, "federation transfer"),
                BalanceUpdate::new(request.payee, request.amount, "federation transfer"),
            ],
            now,
        )?;
        self.adjust_position(&request.source_cell, request.amount)?;
        self.db.put_tx(&FederationTx {
            id: request.tx_id,
            source_cell: request.source_cell,
            target_cell: request.target_cell,
            payer: request.payee,
            payee: request.payee,
            amount: request.amount,
            status: FederationTxStatus::Completed,
            reason: None,
            created_at: now,
        })?;
        Ok(())
    }

    /// The target side of step 5's inverse: undoes a `receive_execute` that
    /// the source later reports as rolled back (e.g. after a lost ack).
    pub fn receive_rollback(&self, id: &FederationTxId, now: Timestamp) -> Result<(), FederationError> {
        let Some(mut tx) = self.db.get_tx(id)? else {
            return Ok(());
        };
        if tx.status != FederationTxStatus::Completed {
            return Ok(());
        }
        self.ledger.apply_balance_updates(
            &[
                BalanceUpdate::new(tx.payee, -tx.amount, "federation transfer rollback"),
                BalanceUpdate::new(self.clearing_account, tx.amount, "federation transfer rollback"),
            ],
            now,
        )?;
        self.adjust_position(&tx.source_cell, -tx.amount)?;
        tx.status = FederationTxStatus::RolledBack;
        self.db.put_tx(&tx)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), FederationError> {
        self.db.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::collaborators::testing::{AcceptingTransport, RejectingTransport};
    use concord_core::CellParameters;

    fn temp_federation(name: &str, cell_id: CellId) -> (FederationEngine, Arc<Ledger>) {
        let ledger_dir = std::env::temp_dir().join(format!("concord_fed_ledger_{name}"));
        let fed_dir = std::env::temp_dir().join(format!("concord_fed_db_{name}"));
        let _ = std::fs::remove_dir_all(&ledger_dir);
        let _ = std::fs::remove_dir_all(&fed_dir);
        let ledger = Arc::new(Ledger::open(&ledger_dir, cell_id, CellParameters::default(), 0).unwrap());
        ledger
            .add_member(MemberId::clearing_account_for(&cell_id), Some(0), 0)
            .unwrap();
        let engine = FederationEngine::open(&fed_dir, ledger.clone(), cell_id, 0.1).unwrap();
        (engine, ledger)
    }

    #[tokio::test]
    async fn transfer_succeeds_and_updates_positions() {
        let cell_a = CellId::from_bytes([1u8; 32]);
        let cell_b = CellId::from_bytes([2u8; 32]);
        let (engine_a, ledger_a) = temp_federation("transfer_succeeds_and_updates_positions", cell_a);
        let payer = MemberId::from_bytes([10u8; 32]);
        ledger_a.add_member(payer, Some(1_000_000), 0).unwrap();
        engine_a.propose_link(cell_b, 0).unwrap();
        engine_a.accept_link(&cell_b).unwrap();

        let payee = MemberId::from_bytes([20u8; 32]);
        let id = FederationTxId::from_bytes([1u8; 16]);
        let status = engine_a
            .initiate_transfer(id, cell_b, payer, payee, 100, &AcceptingTransport, 1)
            .await
            .unwrap();
        assert_eq!(status, FederationTxStatus::Completed);
        assert_eq!(ledger_a.member(&payer).unwrap().balance, -100);
        assert_eq!(
            ledger_a.member(&MemberId::clearing_account_for(&cell_a)).unwrap().balance,
            100
        );
        assert_eq!(engine_a.bilateral_position(&cell_b).unwrap(), -100);
    }

    #[tokio::test]
    async fn target_rejection_rolls_back_source_leg() {
        let cell_a = CellId::from_bytes([3u8; 32]);
        let cell_b = CellId::from_bytes([4u8; 32]);
        let (engine_a, ledger_a) = temp_federation("target_rejection_rolls_back_source_leg", cell_a);
        let payer = MemberId::from_bytes([11u8; 32]);
        ledger_a.add_member(payer, Some(1_000_000), 0).unwrap();
        engine_a.propose_link(cell_b, 0).unwrap();
        engine_a.accept_link(&cell_b).unwrap();

        let payee = MemberId::from_bytes([21u8; 32]);
        let id = FederationTxId::from_bytes([2u8; 16]);
        let transport = RejectingTransport {
            reason: "payee frozen".into(),
        };
        let status = engine_a
            .initiate_transfer(id, cell_b, payer, payee, 50, &transport, 1)
            .await;
        // RejectingTransport rejects at validate_remote, so the protocol
        // aborts before any state change (no source leg to roll back).
        assert!(status.is_err());
        assert_eq!(ledger_a.member(&payer).unwrap().balance, 0);
        assert_eq!(engine_a.bilateral_position(&cell_b).unwrap(), 0);
    }

    #[test]
    fn cap_breach_rejects_without_quarantining_the_cell() {
        let cell_a = CellId::from_bytes([5u8; 32]);
        let cell_b = CellId::from_bytes([6u8; 32]);
        let (engine_a, ledger_a) =
            temp_federation("cap_breach_rejects_without_quarantining_the_cell", cell_a);
        let payer = MemberId::from_bytes([12u8; 32]);
        ledger_a.add_member(payer, Some(1_000_000), 0).unwrap();
        engine_a.propose_link(cell_b, 0).unwrap();
        engine_a.accept_link(&cell_b).unwrap();

        let err = engine_a.validate_source(&payer, &cell_b, 1_000_000).unwrap_err();
        assert!(matches!(err, FederationError::CapExceeded { .. }));
        assert!(!engine_a.is_quarantined().unwrap());
        assert_eq!(engine_a.bilateral_position(&cell_b).unwrap(), 0);
    }

    #[test]
    fn zero_beta_factor_freezes_federation() {
        let cell_a = CellId::from_bytes([7u8; 32]);
        let cell_b = CellId::from_bytes([8u8; 32]);
        let (engine_a, ledger_a) = temp_federation("zero_beta_factor_freezes_federation", cell_a);
        let payer = MemberId::from_bytes([13u8; 32]);
        ledger_a.add_member(payer, Some(1_000_000), 0).unwrap();
        engine_a.propose_link(cell_b, 0).unwrap();
        engine_a.accept_link(&cell_b).unwrap();

        engine_a.set_beta_factor(0.0).unwrap();

        let err = engine_a.validate_source(&payer, &cell_b, 1).unwrap_err();
        assert!(matches!(err, FederationError::FederationFrozen));
    }

    #[tokio::test]
    async fn beta_reduction_below_open_position_quarantines_the_cell() {
        let cell_a = CellId::from_bytes([9u8; 32]);
        let cell_b = CellId::from_bytes([10u8; 32]);
        let (engine_a, ledger_a) =
            temp_federation("beta_reduction_below_open_position_quarantines_the_cell", cell_a);
        let payer = MemberId::from_bytes([14u8; 32]);
        ledger_a.add_member(payer, Some(1_000_000), 0).unwrap();
        engine_a.propose_link(cell_b, 0).unwrap();
        engine_a.accept_link(&cell_b).unwrap();

        let payee = MemberId::from_bytes([22u8; 32]);
        let id = FederationTxId::from_bytes([3u8; 16]);
        let transport = AcceptingTransport;
        engine_a
            .initiate_transfer(id, cell_b, payer, payee, 500, &transport, 1)
            .await
            .unwrap();
        assert!(!engine_a.is_quarantined().unwrap());

        engine_a.set_beta_factor(0.0001).unwrap();
        assert!(engine_a.is_quarantined().unwrap());
    }
}
