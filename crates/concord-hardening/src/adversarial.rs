//! Seven fixed adversarial scenarios (§4.6), each a named agent
//! distribution plus a shock layered on [`crate::simulation`], with a pass
//! criterion evaluated against the resulting [`SimulationReport`].

use concord_core::Balance;
use serde::{Deserialize, Serialize};

use crate::error::HardeningError;
use crate::simulation::{run_simulation, AgentStrategy, Shock, SimulationConfig, SimulationReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scenario {
    ExitScamWave,
    SybilInfiltration,
    CollusivePump,
    ResourceShock,
    FederationSeverance,
    IntermittentConnectivity,
    GovernanceCapture,
}

impl Scenario {
    pub fn id(self) -> &'static str {
        match self {
            Scenario::ExitScamWave => "ADV-01",
            Scenario::SybilInfiltration => "ADV-02",
            Scenario::CollusivePump => "ADV-03",
            Scenario::ResourceShock => "ADV-04",
            Scenario::FederationSeverance => "ADV-05",
            Scenario::IntermittentConnectivity => "ADV-06",
            Scenario::GovernanceCapture => "ADV-07",
        }
    }

    pub fn all() -> [Scenario; 7] {
        [
            Scenario::ExitScamWave,
            Scenario::SybilInfiltration,
            Scenario::CollusivePump,
            Scenario::ResourceShock,
            Scenario::FederationSeverance,
            Scenario::IntermittentConnectivity,
            Scenario::GovernanceCapture,
        ]
    }

    fn config(self, member_count: usize) -> SimulationConfig {
        let shock_tick = 50;
        match self {
            Scenario::ExitScamWave => SimulationConfig {
                ticks: 100,
                member_count,
                distribution: vec![
                    (AgentStrategy::Cooperator, (member_count * 4 / 5).max(1)),
                    (AgentStrategy::Defector, (member_count / 5).max(1)),
                ],
                shocks: vec![(shock_tick, Shock::DefectionWave)],
            },
            Scenario::SybilInfiltration => SimulationConfig {
                ticks: 80,
                member_count,
                distribution: vec![(AgentStrategy::Cooperator, member_count)],
                shocks: vec![(20, Shock::SybilInfiltration)],
            },
            Scenario::CollusivePump => SimulationConfig {
                ticks: 60,
                member_count,
                distribution: vec![
                    (AgentStrategy::Cooperator, (member_count * 2 / 3).max(1)),
                    (AgentStrategy::Colluder, (member_count / 3).max(1)),
                ],
                shocks: Vec::new(),
            },
            Scenario::ResourceShock => SimulationConfig {
                ticks: 60,
                member_count,
                distribution: vec![(AgentStrategy::Cooperator, member_count)],
                shocks: vec![(30, Shock::ResourceScarcity)],
            },
            Scenario::FederationSeverance => SimulationConfig {
                ticks: 60,
                member_count,
                distribution: vec![(AgentStrategy::Cooperator, member_count)],
                shocks: vec![(25, Shock::FederationSeverance)],
            },
            Scenario::IntermittentConnectivity => SimulationConfig {
                ticks: 60,
                member_count,
                distribution: vec![(AgentStrategy::Cooperator, member_count)],
                shocks: vec![(25, Shock::ConnectivityLoss)],
            },
            Scenario::GovernanceCapture => SimulationConfig {
                ticks: 60,
                member_count,
                distribution: vec![(AgentStrategy::Cooperator, member_count)],
                shocks: vec![(25, Shock::GovernanceCapture)],
            },
        }
    }

    /// Returns `None` when the report meets this scenario's pass criterion,
    /// `Some(detail)` describing the breach otherwise.
    fn evaluate(self, default_limit: Balance, member_count: usize, report: &SimulationReport) -> Option<String> {
        if !report.invariant_violations.is_empty() {
            return Some(format!("invariant violations: {:?}", report.invariant_violations));
        }
        match self {
            Scenario::ExitScamWave => {
                let bound = (0.2 * member_count as f64 * default_limit as f64) as Balance;
                if report.extraction_by_defectors > bound {
                    return Some(format!(
                        "extraction {} exceeds bound {bound}",
                        report.extraction_by_defectors
                    ));
                }
                if report.survival_rate < 0.7 {
                    return Some(format!("survival rate {} below 0.7", report.survival_rate));
                }
                None
            }
            Scenario::SybilInfiltration => {
                if report.survival_rate < 0.8 {
                    return Some(format!("survival rate {} below 0.8", report.survival_rate));
                }
                None
            }
            Scenario::CollusivePump => {
                let bound = (0.2 * member_count as f64 * default_limit as f64) as Balance;
                if report.extraction_by_defectors > bound {
                    return Some(format!(
                        "collusive extraction {} exceeds bound {bound}",
                        report.extraction_by_defectors
                    ));
                }
                None
            }
            Scenario::ResourceShock => {
                if report.survival_rate < 0.6 {
                    return Some(format!("survival rate {} below 0.6 under resource scarcity", report.survival_rate));
                }
                None
            }
            Scenario::FederationSeverance => {
                if report.survival_rate < 0.9 {
                    return Some(format!("survival rate {} below 0.9 after severance", report.survival_rate));
                }
                None
            }
            Scenario::IntermittentConnectivity => {
                if report.survival_rate < 0.9 {
                    return Some(format!("survival rate {} below 0.9 under connectivity loss", report.survival_rate));
                }
                None
            }
            Scenario::GovernanceCapture => {
                if report.fulfillment_rate < 0.5 {
                    return Some(format!("fulfillment rate {} below 0.5 under capture", report.fulfillment_rate));
                }
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: Scenario,
    pub report: SimulationReport,
    pub failure: Option<String>,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

pub fn run_scenario(scenario: Scenario, seed: u64, member_count: usize) -> Result<ScenarioResult, HardeningError> {
    let config = scenario.config(member_count);
    let name = format!("adv-{}", scenario.id());
    let report = run_simulation(&name, seed, config)?;
    let default_limit = concord_core::CellParameters::default().default_limit;
    let failure = scenario.evaluate(default_limit, member_count, &report);
    Ok(ScenarioResult { scenario, report, failure })
}

pub fn run_all(seed: u64, member_count: usize) -> Result<Vec<ScenarioResult>, HardeningError> {
    Scenario::all()
        .into_iter()
        .enumerate()
        .map(|(i, scenario)| run_scenario(scenario, seed.wrapping_add(i as u64), member_count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_scam_wave_stays_within_bound() {
        let result = run_scenario(Scenario::ExitScamWave, 77, 20).unwrap();
        assert!(result.passed(), "{:?}", result);
    }

    #[test]
    fn resource_shock_preserves_invariants() {
        let result = run_scenario(Scenario::ResourceShock, 88, 16).unwrap();
        assert!(result.report.invariant_violations.is_empty(), "{:?}", result.report.invariant_violations);
    }
}
