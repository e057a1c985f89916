//! Wires the five ledger-side engines plus `concord-emergency` into one
//! demo cell, the way a real deployment would assemble them behind a
//! transport and a production `Governance`/`Identity` pair. Stands in for
//! the teacher's genesis-and-serve startup sequence, minus the parts this
//! protocol has no use for (P2P gossip, JSON-RPC, a DAG tip set).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use concord_commitments::CommitmentEngine;
use concord_core::collaborators::testing::PermissiveGovernance;
use concord_core::collaborators::Identity;
use concord_core::{CellId, CellParameters, MemberId};
use concord_crypto::KeyPair;
use concord_emergency::EmergencyEngine;
use concord_federation::FederationEngine;
use concord_ledger::Ledger;
use concord_transactions::TransactionEngine;
use tracing::info;

/// Maps demo members to their Dilithium public keys and verifies signatures
/// against them. Real deployments would source admission and key rotation
/// from governance votes; the demo just registers the keypairs it generates
/// on first boot.
struct DemoIdentity {
    keys: HashMap<MemberId, Vec<u8>>,
}

impl Identity for DemoIdentity {
    fn is_active(&self, member: &MemberId) -> bool {
        self.keys.contains_key(member)
    }

    fn public_key(&self, member: &MemberId) -> Option<Vec<u8>> {
        self.keys.get(member).cloned()
    }

    fn verify(&self, member: &MemberId, message: &[u8], signature: &[u8]) -> bool {
        match self.keys.get(member) {
            Some(pk) => concord_crypto::dilithium::verify_signature(pk, message, signature).is_ok(),
            None => false,
        }
    }
}

pub struct Demo {
    pub cell_id: CellId,
    pub remote_cell: CellId,
    pub members: Vec<KeyPair>,
    pub ledger: Arc<Ledger>,
    pub transactions: TransactionEngine,
    pub commitments: CommitmentEngine,
    pub federation: FederationEngine,
    pub emergency: EmergencyEngine,
}

/// Opens (or creates) a demo cell under `data_dir`, seeding `member_count`
/// fresh keypairs on a genesis run. A pre-existing database is reopened as
/// is — no re-seeding, matching the teacher's "skip genesis on existing db"
/// rule. Generated secret keys live only in this process's memory; nothing
/// about the demo is meant to survive a restart as a usable wallet.
pub fn open(data_dir: &Path, member_count: usize) -> anyhow::Result<Demo> {
    std::fs::create_dir_all(data_dir)?;

    let cell_id = CellId::from_bytes(*blake3::hash(b"concord-demo-cell").as_bytes());
    let remote_cell = CellId::from_bytes(*blake3::hash(b"concord-demo-remote-cell").as_bytes());

    let ledger_dir = data_dir.join("ledger");
    let tx_dir = data_dir.join("transactions");
    let commit_dir = data_dir.join("commitments");
    let fed_dir = data_dir.join("federation");

    let fresh = !ledger_dir.exists();

    let ledger = Arc::new(Ledger::open(&ledger_dir, cell_id, CellParameters::default(), 0)?);

    let members: Vec<KeyPair> = (0..member_count).map(|_| KeyPair::generate()).collect();
    let keys = members.iter().map(|kp| (kp.member_id, kp.public_key.clone())).collect();
    let identity = Arc::new(DemoIdentity { keys });

    if fresh {
        info!(cell = %cell_id, members = member_count, "fresh demo cell, seeding members");
        ledger.add_member(MemberId::clearing_account_for(&cell_id), Some(0), 0)?;
        for kp in &members {
            ledger.add_member(kp.member_id, Some(CellParameters::default().default_limit), 0)?;
        }
    } else {
        info!(cell = %cell_id, "existing demo cell found, reusing state");
    }

    let transactions = TransactionEngine::open(&tx_dir, ledger.clone(), identity)?;
    let commitments = CommitmentEngine::open(&commit_dir, ledger.clone(), Arc::new(PermissiveGovernance))?;
    let federation = FederationEngine::open(&fed_dir, ledger.clone(), cell_id, 0.1)?;
    if fresh {
        federation.propose_link(remote_cell, 0)?;
        federation.accept_link(&remote_cell)?;
    }

    let emergency = EmergencyEngine::new(ledger.clone(), Arc::new(PermissiveGovernance), 0);

    Ok(Demo { cell_id, remote_cell, members, ledger, transactions, commitments, federation, emergency })
}

impl Demo {
    /// Samples the indicators Emergency would receive from live monitoring,
    /// then pushes whatever policy results onto the engines that consume it
    /// — `limit_factor` has nowhere to land outside the ledger's own member
    /// records, so only the federation side needs an explicit push here.
    pub fn tick_emergency(&self, dispute_rate: f64, churn_rate: f64, now: i64) -> anyhow::Result<()> {
        let sample = self.emergency.sample_indicators(dispute_rate, churn_rate, None)?;
        let risk_state = self.emergency.record_indicators(sample, now)?;
        let policy = self.emergency.apply_policy(now)?;
        self.federation.set_beta_factor(policy.federation_beta_factor)?;
        info!(?risk_state, beta = policy.federation_beta_factor, "emergency policy applied");
        Ok(())
    }
}
