//! Weighted composite health score (§4.6): invariants 0.4, simulation 0.3,
//! adversarial 0.3, pass threshold 0.85.

use concord_core::constants::{
    HARDENING_MAX_OPERATIONS_PER_ITERATION, HEALTH_PASS_THRESHOLD, HEALTH_WEIGHT_ADVERSARIAL,
    HEALTH_WEIGHT_INVARIANTS, HEALTH_WEIGHT_SIMULATION,
};
use serde::{Deserialize, Serialize};

use crate::adversarial::{self, ScenarioResult};
use crate::error::HardeningError;
use crate::invariants::Invariant;
use crate::runner::{run_invariant, InvariantReport};
use crate::simulation::{run_simulation, SimulationConfig, SimulationReport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub invariant_reports: Vec<InvariantReport>,
    pub simulation_report: SimulationReport,
    pub scenario_results: Vec<ScenarioResult>,
    pub invariants_score: f64,
    pub simulation_score: f64,
    pub adversarial_score: f64,
    pub composite: f64,
}

impl HealthReport {
    pub fn passed(&self) -> bool {
        self.composite >= HEALTH_PASS_THRESHOLD
    }
}

/// Runs every dimension at `iterations`-per-invariant scale (pass the
/// 500–2 000 CI range for a quick check, `HARDENING_DEFAULT_ITERATIONS` for
/// a full run) and folds them into one composite score.
pub fn run_health_check(seed: u64, iterations: u32, member_count: usize) -> Result<HealthReport, HardeningError> {
    let mut invariant_reports = Vec::new();
    for invariant in Invariant::all() {
        let report = run_invariant(
            invariant,
            seed.wrapping_add(invariant as u64),
            iterations,
            HARDENING_MAX_OPERATIONS_PER_ITERATION,
        )?;
        invariant_reports.push(report);
    }
    let invariants_score = average(invariant_reports.iter().map(|r| r.pass_rate()));

    let simulation_report = run_simulation(
        "health-simulation",
        seed.wrapping_add(9_000),
        SimulationConfig::balanced(member_count, 80),
    )?;
    let simulation_score = simulation_score(&simulation_report);

    let scenario_results = adversarial::run_all(seed.wrapping_add(50_000), member_count)?;
    let adversarial_score = average(scenario_results.iter().map(|r| if r.passed() { 1.0 } else { 0.0 }));

    let composite = HEALTH_WEIGHT_INVARIANTS * invariants_score
        + HEALTH_WEIGHT_SIMULATION * simulation_score
        + HEALTH_WEIGHT_ADVERSARIAL * adversarial_score;

    Ok(HealthReport {
        invariant_reports,
        simulation_report,
        scenario_results,
        invariants_score,
        simulation_score,
        adversarial_score,
        composite,
    })
}

fn simulation_score(report: &SimulationReport) -> f64 {
    if !report.invariant_violations.is_empty() {
        return 0.0;
    }
    let components = [
        report.survival_rate,
        1.0 - report.gini.clamp(0.0, 1.0),
        report.fulfillment_rate,
        1.0 - report.freeze_probability,
    ];
    average(components.into_iter())
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        1.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_check_runs_and_scores_in_unit_interval() {
        let report = run_health_check(123, 20, 16).unwrap();
        assert!(report.composite >= 0.0 && report.composite <= 1.0, "{}", report.composite);
    }
}
