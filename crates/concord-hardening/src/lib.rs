//! Property, simulation, and adversarial hardening harness (§4.6): a seeded
//! PRNG drives semantically valid intents against an in-memory [`Cell`]
//! wiring every ledger-adjacent engine, to find invariant violations, score
//! population-level behavior under stress, and check seven fixed
//! adversarial scenarios. None of this runs implicitly — `concord-node`'s
//! `harden` subcommands are the entry point.

pub mod adversarial;
pub mod error;
pub mod harness;
pub mod health;
pub mod invariants;
pub mod rng;
pub mod runner;
pub mod simulation;

pub use adversarial::{run_all as run_all_scenarios, run_scenario, Scenario, ScenarioResult};
pub use error::HardeningError;
pub use harness::{Cell, Operation, OperationOutcome};
pub use health::{run_health_check, HealthReport};
pub use invariants::Invariant;
pub use rng::Xorshift64;
pub use runner::{run_invariant, InvariantReport, IterationResult};
pub use simulation::{run_simulation, AgentStrategy, Shock, SimulationConfig, SimulationReport};
