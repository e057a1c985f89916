//! The six cell-level invariants (§4.1, §4.4), each evaluated against a
//! [`Cell`]'s current snapshot rather than incrementally — cheap enough at
//! harness scale and immune to drift from whatever bug an incremental
//! checker might share with the code it's checking.

use serde::{Deserialize, Serialize};

use crate::error::HardeningError;
use crate::harness::Cell;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Invariant {
    Conservation,
    Floor,
    Reserve,
    EscrowSafety,
    FederationSum,
    FederationCap,
}

impl Invariant {
    pub fn name(self) -> &'static str {
        match self {
            Invariant::Conservation => "I1-conservation",
            Invariant::Floor => "I2-floor",
            Invariant::Reserve => "I3-reserve",
            Invariant::EscrowSafety => "I4-escrow-safety",
            Invariant::FederationSum => "I5-federation-sum",
            Invariant::FederationCap => "I6-federation-cap",
        }
    }

    pub fn all() -> [Invariant; 6] {
        [
            Invariant::Conservation,
            Invariant::Floor,
            Invariant::Reserve,
            Invariant::EscrowSafety,
            Invariant::FederationSum,
            Invariant::FederationCap,
        ]
    }
}

/// `None` means the invariant holds; `Some(detail)` names the first
/// violation found.
pub fn check(cell: &Cell, invariant: Invariant) -> Result<Option<String>, HardeningError> {
    match invariant {
        Invariant::Conservation => {
            if cell.ledger.verify_conservation()? {
                Ok(None)
            } else {
                let sum = cell.ledger.statistics()?.balance_sum;
                Ok(Some(format!("balance_sum = {sum}, expected 0")))
            }
        }
        Invariant::Floor => {
            for member in cell.ledger.all_members()? {
                if !member.satisfies_floor() {
                    return Ok(Some(format!(
                        "member {} balance {} below floor -{}",
                        member.id, member.balance, member.limit
                    )));
                }
            }
            Ok(None)
        }
        Invariant::Reserve => {
            for member in cell.ledger.all_members()? {
                if !member.satisfies_reserve_nonnegative() {
                    return Ok(Some(format!(
                        "member {} reserve {} is negative",
                        member.id, member.reserve
                    )));
                }
            }
            Ok(None)
        }
        Invariant::EscrowSafety => {
            for member in cell.ledger.all_members()? {
                if !member.satisfies_escrow_safety() {
                    return Ok(Some(format!(
                        "member {} balance {} reserve {} breaches escrow safety at limit {}",
                        member.id, member.balance, member.reserve, member.limit
                    )));
                }
            }
            Ok(None)
        }
        Invariant::FederationSum => {
            let clearing = cell.ledger.member(&cell.federation.clearing_account())?;
            let position = cell.federation.aggregate_position()?;
            if clearing.balance == -position {
                Ok(None)
            } else {
                Ok(Some(format!(
                    "clearing account balance {} != -aggregate_position {}",
                    clearing.balance, -position
                )))
            }
        }
        Invariant::FederationCap => {
            let position = cell.federation.aggregate_position()?;
            let cap = cell.federation.exposure_cap()?;
            if position.unsigned_abs() <= cap.unsigned_abs() {
                Ok(None)
            } else {
                Ok(Some(format!(
                    "|aggregate_position| {} exceeds exposure_cap {}",
                    position.unsigned_abs(),
                    cap.unsigned_abs()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cell_satisfies_every_invariant() {
        let cell = Cell::new("invariants-fresh", 1).unwrap();
        for invariant in Invariant::all() {
            assert_eq!(check(&cell, invariant).unwrap(), None, "{}", invariant.name());
        }
    }
}
