//! ─── Concord Protocol Constants ─────────────────────────────────────────────
//!
//! Numeric defaults pulled directly from the component design and testable
//! properties. Every engine that needs one of these imports it from here
//! rather than re-declaring it, so a single change in the threshold table
//! propagates everywhere it is used.

// ── Ledger ─────────────────────────────────────────────────────────────────

/// Default ρ for floor-mass computation: a member contributes to floor mass
/// once `balance <= -rho * limit`.
pub const FLOOR_MASS_RHO: f64 = 0.8;

// ── Federation ───────────────────────────────────────────────────────────────

/// Base exposure-cap factor range, before the Emergency beta multiplier.
pub const FEDERATION_BASE_BETA_MIN: f64 = 0.05;
pub const FEDERATION_BASE_BETA_MAX: f64 = 0.15;

/// Maximum time a federation transfer may wait for a target-side
/// acknowledgement before the transport collaborator is expected to time out.
pub const MAX_SYNC_DELAY_MS: i64 = 30_000;

// ── Emergency ──────────────────────────────────────────────────────────────

pub const STRESSED_FLOOR_MASS_THRESHOLD: f64 = 0.25;
pub const STRESSED_DISPUTE_RATE_THRESHOLD: f64 = 0.05;
pub const STRESSED_OVERALL_STRESS_THRESHOLD: f64 = 1.0;

pub const PANIC_FLOOR_MASS_THRESHOLD: f64 = 0.40;
pub const PANIC_ENERGY_STRESS_THRESHOLD: f64 = 1.2;

pub const DEESCALATE_FLOOR_MASS_THRESHOLD: f64 = 0.15;
pub const DEESCALATE_OVERALL_STRESS_THRESHOLD: f64 = 0.8;

/// Minimum dwell time in a state before de-escalation is permitted, absent a
/// governance override.
pub const STABILIZATION_DWELL_MS: i64 = 24 * 60 * 60 * 1000;

/// Stressed-state policy factors.
pub const STRESSED_NEW_MEMBER_LIMIT_FACTOR: f64 = 0.7;
pub const STRESSED_FEDERATION_BETA_FACTOR: f64 = 0.7;

/// Panic-state policy factors.
pub const PANIC_LIMIT_FACTOR: f64 = 0.8;
pub const PANIC_NEW_MEMBER_LIMIT_FACTOR: f64 = 0.5;
pub const PANIC_FEDERATION_BETA_FACTOR: f64 = 0.0;

/// Per-step rate limit (η) on Emergency-driven limit reductions, as a
/// fraction of the member's current limit.
pub const LIMIT_REDUCTION_RATE_LIMIT: f64 = 0.1;

// ── Hardening ────────────────────────────────────────────────────────────────

/// Default invariant-runner iteration count; reduced under `cfg(test)`.
pub const HARDENING_DEFAULT_ITERATIONS: u64 = 100_000;
pub const HARDENING_CI_ITERATIONS_MIN: u64 = 500;
pub const HARDENING_CI_ITERATIONS_MAX: u64 = 2_000;

/// Default cap on generated operations per invariant-runner iteration.
pub const HARDENING_MAX_OPERATIONS_PER_ITERATION: u32 = 50;

/// Operation-mix weights (must sum to 100).
pub const OPWEIGHT_TRANSACTION: u32 = 40;
pub const OPWEIGHT_COMMITMENT_CREATE: u32 = 20;
pub const OPWEIGHT_COMMITMENT_FULFILL: u32 = 15;
pub const OPWEIGHT_COMMITMENT_CANCEL: u32 = 5;
pub const OPWEIGHT_LIMIT_ADJUST: u32 = 5;
pub const OPWEIGHT_MEMBER_ADD: u32 = 5;
pub const OPWEIGHT_MEMBER_REMOVE: u32 = 2;
pub const OPWEIGHT_FEDERATION_TX: u32 = 8;

/// Health-score weights (must sum to 1.0) and pass threshold.
pub const HEALTH_WEIGHT_INVARIANTS: f64 = 0.4;
pub const HEALTH_WEIGHT_SIMULATION: f64 = 0.3;
pub const HEALTH_WEIGHT_ADVERSARIAL: f64 = 0.3;
pub const HEALTH_PASS_THRESHOLD: f64 = 0.85;
