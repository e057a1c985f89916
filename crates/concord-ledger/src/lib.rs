pub mod db;
pub mod engine;
pub mod error;
pub mod types;

pub use db::{CellMeta, LedgerDb, LedgerEvent, LedgerEventType};
pub use engine::Ledger;
pub use error::LedgerError;
pub use types::{BalanceUpdate, ReserveUpdate, Statistics};
