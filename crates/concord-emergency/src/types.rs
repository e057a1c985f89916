use serde::{Deserialize, Serialize};

use concord_core::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskState {
    Normal,
    Stressed,
    Panic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionMode {
    Open,
    Bonded,
    SupermajorityBonded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitmentMode {
    Unrestricted,
    EscrowEssentials,
    EscrowAll,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerPriority {
    Normal,
    EssentialsFirst,
    Survival,
}

/// One snapshot of the signals Emergency watches (§4.5). `balance_variance`
/// arrives pre-normalized (e.g. variance / mean_limit^2) by the caller, since
/// only the caller knows the cell's typical scale.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Indicators {
    pub floor_mass: f64,
    pub balance_variance: f64,
    pub dispute_rate: f64,
    pub churn_rate: f64,
    pub energy_stress: Option<f64>,
}

impl Indicators {
    /// Largest of the normalized economic components, each scaled against
    /// the threshold that would alone trigger Stressed — so a value over
    /// `1.0` means at least one component has crossed its own threshold.
    pub fn economic_stress(&self, stressed_floor_mass: f64, stressed_dispute_rate: f64) -> f64 {
        let floor_component = self.floor_mass / stressed_floor_mass;
        let dispute_component = self.dispute_rate / stressed_dispute_rate;
        floor_component.max(dispute_component).max(self.balance_variance)
    }

    pub fn overall_stress(&self, stressed_floor_mass: f64, stressed_dispute_rate: f64) -> f64 {
        self.economic_stress(stressed_floor_mass, stressed_dispute_rate)
            .max(self.energy_stress.unwrap_or(0.0))
    }
}

/// The policy a `RiskState` implies (§4.5 "Policies"), consumed by Ledger
/// (via `limit_factor`/`new_member_limit_factor`), Federation (via
/// `federation_beta_factor`), and Commitments/Identity (via the mode enums).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Policy {
    pub limit_factor: f64,
    pub new_member_limit_factor: f64,
    pub federation_beta_factor: f64,
    pub admission_mode: AdmissionMode,
    pub commitment_mode: CommitmentMode,
    pub scheduler_priority: SchedulerPriority,
    pub debtor_priority: bool,
}

impl Policy {
    pub fn for_state(state: RiskState) -> Self {
        use concord_core::constants::*;
        match state {
            RiskState::Normal => Self {
                limit_factor: 1.0,
                new_member_limit_factor: 1.0,
                federation_beta_factor: 1.0,
                admission_mode: AdmissionMode::Open,
                commitment_mode: CommitmentMode::Unrestricted,
                scheduler_priority: SchedulerPriority::Normal,
                debtor_priority: false,
            },
            RiskState::Stressed => Self {
                limit_factor: 1.0,
                new_member_limit_factor: STRESSED_NEW_MEMBER_LIMIT_FACTOR,
                federation_beta_factor: STRESSED_FEDERATION_BETA_FACTOR,
                admission_mode: AdmissionMode::Bonded,
                commitment_mode: CommitmentMode::EscrowEssentials,
                scheduler_priority: SchedulerPriority::EssentialsFirst,
                debtor_priority: false,
            },
            RiskState::Panic => Self {
                limit_factor: PANIC_LIMIT_FACTOR,
                new_member_limit_factor: PANIC_NEW_MEMBER_LIMIT_FACTOR,
                federation_beta_factor: PANIC_FEDERATION_BETA_FACTOR,
                admission_mode: AdmissionMode::SupermajorityBonded,
                commitment_mode: CommitmentMode::EscrowAll,
                scheduler_priority: SchedulerPriority::Survival,
                debtor_priority: true,
            },
        }
    }
}

/// Persisted emergency state: the current risk state, when it last changed,
/// when Panic was most recently entered (for dwell gating), and the policy
/// currently in force.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmergencyState {
    pub risk_state: RiskState,
    pub last_state_change: Timestamp,
    pub panic_entered_at: Option<Timestamp>,
    pub current_policy: Policy,
}

impl EmergencyState {
    pub fn initial(now: Timestamp) -> Self {
        Self {
            risk_state: RiskState::Normal,
            last_state_change: now,
            panic_entered_at: None,
            current_policy: Policy::for_state(RiskState::Normal),
        }
    }
}
