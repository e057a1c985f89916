use serde::{Deserialize, Serialize};

use crate::{Balance, MemberId, Timestamp};

/// Status of a member entry. Only `Active` members may appear as payer/payee
/// in new spot transactions or promisor/promisee in new commitments;
/// existing reserves and balances of a non-active member are preserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    Pending,
    Probation,
    Active,
    Frozen,
    Excluded,
}

impl MemberStatus {
    /// Whether a member in this status may be a principal in a new mutation.
    pub fn can_transact(self) -> bool {
        matches!(self, MemberStatus::Active)
    }
}

/// Cell-wide configuration. Clamps and the escrow-safety toggle apply to
/// every member in the cell uniformly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellParameters {
    pub default_limit: Balance,
    pub min_limit: Balance,
    pub max_limit: Balance,
    pub enforce_escrow_safety: bool,
}

impl CellParameters {
    /// Clamp a requested limit into `[min_limit, max_limit]`.
    pub fn clamp_limit(&self, requested: Balance) -> Balance {
        requested.clamp(self.min_limit, self.max_limit)
    }
}

impl Default for CellParameters {
    fn default() -> Self {
        Self {
            default_limit: 1_000,
            min_limit: 0,
            max_limit: 1_000_000,
            enforce_escrow_safety: true,
        }
    }
}

/// A single member's ledger entry.
///
/// Owned exclusively by the Ledger engine and mutated only through its
/// atomic API (§3 "Lifecycle & ownership"). The clearing account is an
/// ordinary `Member` with a reserved id (`MemberId::clearing_account_for`)
/// that participates in conservation but is never a spending principal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub balance: Balance,
    pub limit: Balance,
    pub reserve: Balance,
    pub status: MemberStatus,
    pub joined_at: Timestamp,
    pub last_activity: Timestamp,
}

impl Member {
    pub fn new(id: MemberId, limit: Balance, now: Timestamp) -> Self {
        Self {
            id,
            balance: 0,
            limit,
            reserve: 0,
            status: MemberStatus::Active,
            joined_at: now,
            last_activity: now,
        }
    }

    /// `limit + balance - reserve` — the most this member could still spend
    /// without crossing its floor, after excluding capacity locked by
    /// active Escrowed commitments.
    pub fn available_capacity(&self) -> Balance {
        self.limit + self.balance - self.reserve
    }

    /// `balance - reserve - amount >= -limit`, i.e. spending `amount` would
    /// not cross the floor once reserved capacity is excluded.
    pub fn can_spend(&self, amount: Balance) -> bool {
        self.status.can_transact() && self.balance - self.reserve - amount >= -self.limit
    }

    /// I2: the floor invariant, evaluated on the member's current balance.
    pub fn satisfies_floor(&self) -> bool {
        self.balance >= -self.limit
    }

    /// I3: reserve must never go negative.
    pub fn satisfies_reserve_nonnegative(&self) -> bool {
        self.reserve >= 0
    }

    /// I4: escrow safety — balance net of reserved capacity must still clear
    /// the floor.
    pub fn satisfies_escrow_safety(&self) -> bool {
        self.balance - self.reserve >= -self.limit
    }

    /// Whether this member contributes to floor mass under ratio `rho`.
    pub fn contributes_to_floor_mass(&self, rho: f64) -> bool {
        (self.balance as f64) <= -rho * (self.limit as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(balance: Balance, limit: Balance, reserve: Balance) -> Member {
        Member {
            id: MemberId::from_bytes([1u8; 32]),
            balance,
            limit,
            reserve,
            status: MemberStatus::Active,
            joined_at: 0,
            last_activity: 0,
        }
    }

    #[test]
    fn available_capacity_nets_out_reserve() {
        let m = member(0, 100, 20);
        assert_eq!(m.available_capacity(), 80);
    }

    #[test]
    fn can_spend_respects_floor_and_reserve() {
        let m = member(0, 100, 20);
        assert!(m.can_spend(80));
        assert!(!m.can_spend(81));
    }

    #[test]
    fn frozen_member_cannot_transact() {
        let mut m = member(0, 100, 0);
        m.status = MemberStatus::Frozen;
        assert!(!m.can_spend(1));
    }

    #[test]
    fn floor_mass_threshold() {
        let m = member(-80, 100, 0);
        assert!(m.contributes_to_floor_mass(0.8));
        assert!(!m.contributes_to_floor_mass(0.81));
    }
}
