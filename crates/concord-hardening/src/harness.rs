//! An in-memory cell wired with all five engines plus a pool of pre-keyed
//! identities, driven by randomly generated semantically-valid intents.

use std::sync::Arc;

use concord_core::collaborators::testing::{AcceptingTransport, PermissiveGovernance, StubIdentity};
use concord_core::constants::{
    OPWEIGHT_COMMITMENT_CANCEL, OPWEIGHT_COMMITMENT_CREATE, OPWEIGHT_COMMITMENT_FULFILL,
    OPWEIGHT_FEDERATION_TX, OPWEIGHT_LIMIT_ADJUST, OPWEIGHT_MEMBER_ADD, OPWEIGHT_MEMBER_REMOVE,
    OPWEIGHT_TRANSACTION,
};
use concord_core::{Balance, CellId, CellParameters, CommitmentId, FederationTxId, MemberId, TransactionId};
use concord_commitments::{Category, CommitmentEngine, CommitmentKind, FulfilmentConfirmation};
use concord_federation::FederationEngine;
use concord_ledger::Ledger;
use concord_transactions::TransactionEngine;

use crate::error::HardeningError;
use crate::rng::Xorshift64;

const POOL_SIZE: usize = 24;
const INITIAL_MEMBERS: usize = 6;

#[derive(Debug, Clone)]
pub enum Operation {
    Transaction { payer: MemberId, payee: MemberId, amount: Balance },
    CommitmentCreate { promisor: MemberId, promisee: MemberId, value: Balance, kind: CommitmentKind },
    CommitmentFulfill { id: CommitmentId },
    CommitmentCancel { id: CommitmentId },
    LimitAdjust { member: MemberId, new_limit: Balance },
    MemberAdd { id: MemberId },
    MemberRemove { id: MemberId },
    FederationTx { payer: MemberId, amount: Balance },
}

pub struct OperationOutcome {
    pub accepted: bool,
    pub detail: String,
}

impl OperationOutcome {
    fn accepted() -> Self {
        Self { accepted: true, detail: String::new() }
    }

    fn rejected(detail: impl Into<String>) -> Self {
        Self { accepted: false, detail: detail.into() }
    }
}

/// One harness-owned identity: a pool member the generator can add to or
/// remove from the ledger, plus the key `StubIdentity` verifies signatures
/// against.
#[derive(Clone)]
struct Identity {
    id: MemberId,
    key: String,
}

pub struct Cell {
    pub cell_id: CellId,
    pub remote_cell: CellId,
    pub ledger: Arc<Ledger>,
    pub transactions: TransactionEngine,
    pub commitments: CommitmentEngine,
    pub federation: FederationEngine,
    pool: Vec<Identity>,
    created_commitments: Vec<(CommitmentId, MemberId, MemberId)>,
    tx_counter: u64,
    commitment_counter: u64,
    federation_counter: u64,
    /// `initiate_transfer` awaits `tokio::time::timeout`, which panics
    /// outside a Tokio runtime context — `futures::executor::block_on`
    /// alone isn't enough, so each cell carries its own single-threaded one.
    rt: tokio::runtime::Runtime,
}

impl Cell {
    pub fn new(name: &str, seed: u64) -> Result<Self, HardeningError> {
        let cell_id = CellId::from_bytes(derive_bytes32(seed, 0xC0));
        let remote_cell = CellId::from_bytes(derive_bytes32(seed, 0xC1));

        let ledger_dir = std::env::temp_dir().join(format!("concord_hardening_ledger_{name}_{seed}"));
        let tx_dir = std::env::temp_dir().join(format!("concord_hardening_tx_{name}_{seed}"));
        let commit_dir = std::env::temp_dir().join(format!("concord_hardening_commit_{name}_{seed}"));
        let fed_dir = std::env::temp_dir().join(format!("concord_hardening_fed_{name}_{seed}"));
        for dir in [&ledger_dir, &tx_dir, &commit_dir, &fed_dir] {
            let _ = std::fs::remove_dir_all(dir);
        }

        let ledger = Arc::new(Ledger::open(&ledger_dir, cell_id, CellParameters::default(), 0)?);
        ledger.add_member(MemberId::clearing_account_for(&cell_id), Some(0), 0)?;

        let mut identity = StubIdentity::new();
        let mut pool = Vec::with_capacity(POOL_SIZE);
        for i in 0..POOL_SIZE {
            let id = MemberId::from_bytes(derive_bytes32(seed, i as u64));
            let key = format!("pool-key-{i}");
            identity.register(id, key.as_bytes().to_vec());
            pool.push(Identity { id, key });
        }
        let identity = Arc::new(identity);

        for member in pool.iter().take(INITIAL_MEMBERS) {
            ledger.add_member(member.id, Some(CellParameters::default().default_limit), 0)?;
        }

        let transactions = TransactionEngine::open(&tx_dir, ledger.clone(), identity)?;
        let commitments =
            CommitmentEngine::open(&commit_dir, ledger.clone(), Arc::new(PermissiveGovernance))?;
        let federation = FederationEngine::open(&fed_dir, ledger.clone(), cell_id, 0.1)?;
        federation.propose_link(remote_cell, 0)?;
        federation.accept_link(&remote_cell)?;

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("building current-thread runtime");

        Ok(Self {
            cell_id,
            remote_cell,
            ledger,
            transactions,
            commitments,
            federation,
            pool,
            created_commitments: Vec::new(),
            tx_counter: 0,
            commitment_counter: 0,
            federation_counter: 0,
            rt,
        })
    }

    /// The fixed identity pool backing this cell, in registration order —
    /// used by callers (the simulation engine) that need more members than
    /// [`Cell::new`] starts with.
    pub fn pool_ids(&self) -> Vec<MemberId> {
        self.pool.iter().map(|p| p.id).collect()
    }

    /// The most recently created-and-accepted commitment, if any — used by
    /// callers that create a commitment and immediately decide whether to
    /// fulfill or cancel it without tracking the id themselves.
    pub fn last_created_commitment(&self) -> Option<CommitmentId> {
        self.created_commitments.last().map(|(id, _, _)| *id)
    }

    fn active_members(&self) -> Result<Vec<MemberId>, HardeningError> {
        Ok(self
            .ledger
            .all_members()?
            .into_iter()
            .filter(|m| m.status.can_transact() && m.id != MemberId::clearing_account_for(&self.cell_id))
            .map(|m| m.id)
            .collect())
    }

    fn key_of(&self, id: &MemberId) -> &str {
        self.pool
            .iter()
            .find(|p| &p.id == id)
            .map(|p| p.key.as_str())
            .unwrap_or("")
    }

    /// Consults current ledger/commitment state so the generator leans
    /// toward operations that should succeed — it mixes semantically valid
    /// intents, not raw bytes.
    pub fn generate_operation(&self, rng: &mut Xorshift64) -> Result<Option<Operation>, HardeningError> {
        let active = self.active_members()?;
        if active.len() < 2 {
            return Ok(Some(self.gen_member_add(rng)));
        }

        let weights: &[(u32, u8)] = &[
            (OPWEIGHT_TRANSACTION, 0),
            (OPWEIGHT_COMMITMENT_CREATE, 1),
            (OPWEIGHT_COMMITMENT_FULFILL, 2),
            (OPWEIGHT_COMMITMENT_CANCEL, 3),
            (OPWEIGHT_LIMIT_ADJUST, 4),
            (OPWEIGHT_MEMBER_ADD, 5),
            (OPWEIGHT_MEMBER_REMOVE, 6),
            (OPWEIGHT_FEDERATION_TX, 7),
        ];
        let choice = *rng.weighted(weights);

        let op = match choice {
            0 => {
                let payer = *rng.pick(&active).unwrap();
                let payee = *rng.pick(&active).unwrap();
                if payer == payee {
                    return Ok(None);
                }
                let amount = rng.range(1, 50) as Balance;
                Operation::Transaction { payer, payee, amount }
            }
            1 => {
                let promisor = *rng.pick(&active).unwrap();
                let promisee = *rng.pick(&active).unwrap();
                if promisor == promisee {
                    return Ok(None);
                }
                let value = rng.range(1, 60) as Balance;
                let kind = if rng.chance(1, 2) {
                    CommitmentKind::Escrowed
                } else {
                    CommitmentKind::Soft
                };
                Operation::CommitmentCreate { promisor, promisee, value, kind }
            }
            2 => match rng.pick(&self.created_commitments) {
                Some((id, _, _)) => Operation::CommitmentFulfill { id: *id },
                None => return Ok(None),
            },
            3 => match rng.pick(&self.created_commitments) {
                Some((id, _, _)) => Operation::CommitmentCancel { id: *id },
                None => return Ok(None),
            },
            4 => {
                let member = *rng.pick(&active).unwrap();
                let new_limit = rng.range(0, 2_000) as Balance;
                Operation::LimitAdjust { member, new_limit }
            }
            5 => self.gen_member_add(rng),
            6 => {
                let member = *rng.pick(&active).unwrap();
                Operation::MemberRemove { id: member }
            }
            _ => {
                let payer = *rng.pick(&active).unwrap();
                let amount = rng.range(1, 40) as Balance;
                Operation::FederationTx { payer, amount }
            }
        };
        Ok(Some(op))
    }

    fn gen_member_add(&self, rng: &mut Xorshift64) -> Operation {
        let dormant: Vec<MemberId> = self
            .pool
            .iter()
            .filter(|p| self.ledger.member(&p.id).is_err())
            .map(|p| p.id)
            .collect();
        match rng.pick(&dormant) {
            Some(id) => Operation::MemberAdd { id: *id },
            None => Operation::MemberAdd { id: self.pool[0].id },
        }
    }

    pub fn apply(&mut self, op: &Operation, now: i64) -> OperationOutcome {
        match self.apply_inner(op, now) {
            Ok(outcome) => outcome,
            Err(err) => OperationOutcome::rejected(err.to_string()),
        }
    }

    fn apply_inner(&mut self, op: &Operation, now: i64) -> Result<OperationOutcome, HardeningError> {
        match op {
            Operation::Transaction { payer, payee, amount } => {
                self.tx_counter += 1;
                let id = TransactionId::from_bytes(derive_bytes16(self.tx_counter, 0xA0));
                let tx = match self.transactions.create_spot(id, *payer, *payee, *amount, "hardening", self.tx_counter, now) {
                    Ok(tx) => tx,
                    Err(err) => return Ok(OperationOutcome::rejected(err.to_string())),
                };
                let body = tx.body_bytes();
                let payer_sig = sign(payer, self.key_of(payer), &body);
                let payee_sig = sign(payee, self.key_of(payee), &body);
                self.transactions.sign_as_payer(&id, payer_sig)?;
                self.transactions.sign_as_payee(&id, payee_sig)?;
                match self.transactions.execute(&id, now) {
                    Ok(_) => Ok(OperationOutcome::accepted()),
                    Err(err) => Ok(OperationOutcome::rejected(err.to_string())),
                }
            }
            Operation::CommitmentCreate { promisor, promisee, value, kind } => {
                self.commitment_counter += 1;
                let id = CommitmentId::from_bytes(derive_bytes16(self.commitment_counter, 0xB0));
                let created = self.commitments.create_commitment(
                    id,
                    *kind,
                    *promisor,
                    *promisee,
                    *value,
                    Category::Other,
                    "hardening",
                    None,
                    now,
                );
                if let Err(err) = created {
                    return Ok(OperationOutcome::rejected(err.to_string()));
                }
                match self.commitments.accept_commitment(&id, *promisee, now) {
                    Ok(_) => {
                        self.created_commitments.push((id, *promisor, *promisee));
                        Ok(OperationOutcome::accepted())
                    }
                    Err(err) => Ok(OperationOutcome::rejected(err.to_string())),
                }
            }
            Operation::CommitmentFulfill { id } => {
                let Some((_, _, promisee)) = self.created_commitments.iter().find(|(cid, _, _)| cid == id).copied() else {
                    return Ok(OperationOutcome::rejected("unknown commitment"));
                };
                let confirmation = FulfilmentConfirmation { confirmed_by: promisee, rating: None, notes: None };
                match self.commitments.fulfill_commitment(id, confirmation, now) {
                    Ok(_) => Ok(OperationOutcome::accepted()),
                    Err(err) => Ok(OperationOutcome::rejected(err.to_string())),
                }
            }
            Operation::CommitmentCancel { id } => {
                let Some((_, promisor, _)) = self.created_commitments.iter().find(|(cid, _, _)| cid == id).copied() else {
                    return Ok(OperationOutcome::rejected("unknown commitment"));
                };
                match self.commitments.cancel_commitment(id, promisor, "hardening cancel", now) {
                    Ok(_) => Ok(OperationOutcome::accepted()),
                    Err(err) => Ok(OperationOutcome::rejected(err.to_string())),
                }
            }
            Operation::LimitAdjust { member, new_limit } => {
                self.ledger.update_member_limit(*member, *new_limit, now)?;
                Ok(OperationOutcome::accepted())
            }
            Operation::MemberAdd { id } => {
                match self.ledger.add_member(*id, Some(CellParameters::default().default_limit), now) {
                    Ok(_) => Ok(OperationOutcome::accepted()),
                    Err(err) => Ok(OperationOutcome::rejected(err.to_string())),
                }
            }
            Operation::MemberRemove { id } => {
                let count = self.commitments.active_commitment_count(id)?;
                match self.ledger.remove_member(*id, count, now) {
                    Ok(_) => Ok(OperationOutcome::accepted()),
                    Err(err) => Ok(OperationOutcome::rejected(err.to_string())),
                }
            }
            Operation::FederationTx { payer, amount } => {
                self.federation_counter += 1;
                let id = FederationTxId::from_bytes(derive_bytes16(self.federation_counter, 0xD0));
                let remote_payee = MemberId::from_bytes(derive_bytes32(self.federation_counter, 0xE0));
                let fut = self.federation.initiate_transfer(
                    id,
                    self.remote_cell,
                    *payer,
                    remote_payee,
                    *amount,
                    &AcceptingTransport,
                    now,
                );
                match self.rt.block_on(fut) {
                    Ok(_) => Ok(OperationOutcome::accepted()),
                    Err(err) => Ok(OperationOutcome::rejected(err.to_string())),
                }
            }
        }
    }
}

fn sign(member: &MemberId, key: &str, body: &[u8]) -> Vec<u8> {
    let mut want = member.as_bytes().to_vec();
    want.extend_from_slice(body);
    want.extend_from_slice(key.as_bytes());
    blake3::hash(&want).as_bytes().to_vec()
}

fn derive_bytes32(seed: u64, salt: u64) -> [u8; 32] {
    let mut rng = Xorshift64::new(seed ^ salt.wrapping_mul(0x9E3779B97F4A7C15));
    let mut out = [0u8; 32];
    for chunk in out.chunks_mut(8) {
        chunk.copy_from_slice(&rng.next_u64().to_le_bytes());
    }
    out
}

fn derive_bytes16(seed: u64, salt: u64) -> [u8; 16] {
    let mut rng = Xorshift64::new(seed ^ salt.wrapping_mul(0x9E3779B97F4A7C15));
    let mut out = [0u8; 16];
    for chunk in out.chunks_mut(8) {
        chunk.copy_from_slice(&rng.next_u64().to_le_bytes());
    }
    out
}
