pub mod db;
pub mod engine;
pub mod error;
pub mod types;

pub use db::CommitmentDb;
pub use engine::CommitmentEngine;
pub use error::CommitmentsError;
pub use types::{
    Category, Commitment, CommitmentId, CommitmentKind, CommitmentStatus, FulfilmentConfirmation,
};
