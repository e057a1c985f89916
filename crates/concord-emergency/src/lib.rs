pub mod engine;
pub mod error;
pub mod types;

pub use engine::EmergencyEngine;
pub use error::EmergencyError;
pub use types::{
    AdmissionMode, CommitmentMode, EmergencyState, Indicators, Policy, RiskState,
    SchedulerPriority,
};
