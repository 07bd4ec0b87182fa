//! Exchange fee schedule: taker fees, maker fees and break-even math.
//!
//! Fees follow the exchange formula `rate * C * P * (1 - P)` with ceiling
//! rounding, so every quoted edge is conservative. Maker break-evens are
//! amortized at a 1000-contract calibration size, matching how the exchange
//! UI quotes per-contract maker cost.

use serde::{Deserialize, Serialize};

/// Which fee schedule applies to an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRole {
    Taker,
    Maker,
}

/// Taker/maker fee rates plus the maker amortization size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub taker_rate: f64,
    pub maker_rate: f64,
    /// Contract count used to amortize the ceiling-rounded maker fee into a
    /// per-contract figure for break-even quoting.
    pub maker_calibration_contracts: u32,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            taker_rate: 0.07,
            maker_rate: 0.0175,
            maker_calibration_contracts: 1000,
        }
    }
}

impl FeeSchedule {
    /// Taker fee in dollars for `contracts` at `price_cents`, rounded up to
    /// the next cent.
    pub fn taker_fee_dollars(&self, contracts: u32, price_cents: u8) -> f64 {
        let p = f64::from(price_cents) / 100.0;
        let raw = self.taker_rate * f64::from(contracts) * p * (1.0 - p);
        (raw * 100.0).ceil() / 100.0
    }

    /// Maker fee in whole cents for `contracts` at `price_cents`, rounded up.
    pub fn maker_fee_cents(&self, price_cents: u8, contracts: u32) -> u64 {
        let p = f64::from(price_cents) / 100.0;
        let raw_dollars = self.maker_rate * f64::from(contracts) * p * (1.0 - p);
        (raw_dollars * 100.0).ceil() as u64
    }

    /// Per-contract fee charged on a winning contract, in cents.
    pub fn fee_on_win_cents(&self, role: FeeRole, price_cents: u8) -> f64 {
        match role {
            FeeRole::Taker => self.taker_fee_dollars(1, price_cents) * 100.0,
            FeeRole::Maker => {
                let c = self.maker_calibration_contracts.max(1);
                self.maker_fee_cents(price_cents, c) as f64 / f64::from(c)
            }
        }
    }

    /// Fee-adjusted break-even win probability for paying `price_cents`.
    ///
    /// Returns None outside the executable 1-99 range.
    pub fn break_even(&self, role: FeeRole, price_cents: u8) -> Option<f64> {
        if price_cents == 0 || price_cents >= 100 {
            return None;
        }
        let after_fee_cents = f64::from(price_cents) + self.fee_on_win_cents(role, price_cents);
        Some((after_fee_cents / 100.0).clamp(0.0, 1.0))
    }

    /// Highest postable maker price whose fee-inclusive effective price
    /// stays within `limit_price_cents`. None when no such price exists.
    pub fn adjust_maker_price_for_fees(&self, limit_price_cents: u8) -> Option<u8> {
        if limit_price_cents <= 2 {
            return None;
        }
        // Search downward from limit - 1, since the fee always adds.
        for post_price in (1..limit_price_cents).rev() {
            let fee_cents = self.maker_fee_cents(post_price, 1);
            let effective = u64::from(post_price) + fee_cents;
            if effective <= u64::from(limit_price_cents) {
                return Some(post_price);
            }
        }
        None
    }

    /// Total cost in dollars (contracts * price + taker fees) at one level.
    pub fn level_all_in_cost(&self, contracts: u32, price_cents: u8) -> f64 {
        let contract_cost = f64::from(contracts) * f64::from(price_cents) / 100.0;
        contract_cost + self.taker_fee_dollars(contracts, price_cents)
    }

    /// Max contracts affordable at a level given `remaining` dollars.
    pub fn max_affordable_contracts(&self, remaining: f64, price_cents: u8, available: u32) -> u32 {
        for c in (1..=available).rev() {
            if self.level_all_in_cost(c, price_cents) <= remaining + 1e-9 {
                return c;
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taker_fee_ceils_to_next_cent() {
        let fees = FeeSchedule::default();
        // 0.07 * 1 * 0.62 * 0.38 = 0.016492 -> ceil to 0.02
        assert!((fees.taker_fee_dollars(1, 62) - 0.02).abs() < 1e-12);
        // 0.07 * 1 * 0.50 * 0.50 = 0.0175 -> ceil to 0.02
        assert!((fees.taker_fee_dollars(1, 50) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_maker_fee_cents() {
        let fees = FeeSchedule::default();
        // 0.0175 * 1000 * 0.44 * 0.56 * 100 = 431.2 -> 432
        assert_eq!(fees.maker_fee_cents(44, 1000), 432);
        // Single contract at 50c: 0.004375 dollars -> 1 cent
        assert_eq!(fees.maker_fee_cents(50, 1), 1);
    }

    #[test]
    fn test_maker_break_even_calibration() {
        let fees = FeeSchedule::default();
        // 44c + 432/1000c = 44.432c -> 0.44432
        let be = fees.break_even(FeeRole::Maker, 44).unwrap();
        assert!((be - 0.44432).abs() < 1e-9);
    }

    #[test]
    fn test_break_even_bounds() {
        let fees = FeeSchedule::default();
        assert!(fees.break_even(FeeRole::Taker, 0).is_none());
        assert!(fees.break_even(FeeRole::Taker, 100).is_none());
        let be = fees.break_even(FeeRole::Taker, 99).unwrap();
        assert!(be <= 1.0);
    }

    #[test]
    fn test_adjust_maker_price_for_fees() {
        let fees = FeeSchedule::default();
        // Post at 89: fee = ceil(0.0175 * 0.89 * 0.11 * 100) = 1c, effective 90.
        assert_eq!(fees.adjust_maker_price_for_fees(90), Some(89));
        assert_eq!(fees.adjust_maker_price_for_fees(2), None);
    }

    #[test]
    fn test_level_all_in_cost_and_sizing() {
        let fees = FeeSchedule::default();
        let cost = fees.level_all_in_cost(10, 50);
        // 10 * 0.50 + ceil(0.07 * 10 * 0.25 * 100)/100 = 5.00 + 0.18
        assert!((cost - 5.18).abs() < 1e-9);

        let n = fees.max_affordable_contracts(5.18, 50, 20);
        assert_eq!(n, 10);
        assert_eq!(fees.max_affordable_contracts(0.10, 50, 20), 0);
    }
}
