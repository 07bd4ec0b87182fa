//! Expected value per contract under taker and maker execution.
//!
//! Fees apply only to winning contracts. Results are returned for every
//! scenario, positive or negative; filtering to +EV and ranking by the best
//! scenario are caller responsibilities.

use crate::pricing::{FeeRole, FeeSchedule};
use crate::types::{EvResult, EvScenario, PricingResult};

/// EV in dollars per contract with fees charged on wins only.
///
/// `EV = p_win * ((1 - P) - fee_on_win) - (1 - p_win) * P`, with price and
/// fee as 0-1 fractions of the dollar payout.
pub fn expected_value(p_win: f64, price_cents: u8, fee_on_win_cents: f64) -> f64 {
    let p = f64::from(price_cents) / 100.0;
    let fee_on_win = fee_on_win_cents / 100.0;
    p_win * ((1.0 - p) - fee_on_win) - (1.0 - p_win) * p
}

/// Combines consensus probability, derived pricing and the fee schedule.
#[derive(Debug, Clone, Default)]
pub struct EvEngine {
    fees: FeeSchedule,
}

impl EvEngine {
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    /// EV for one scenario against a pricing result. None when the scenario
    /// has no executable price (empty opposing book, inside below the floor).
    pub fn evaluate(
        &self,
        p_win: f64,
        pricing: &PricingResult,
        scenario: EvScenario,
    ) -> Option<EvResult> {
        let (price_cents, role) = match scenario {
            EvScenario::Take => (pricing.best_price?, FeeRole::Taker),
            EvScenario::PostInside => (pricing.inside_price?, FeeRole::Maker),
        };
        let fee_on_win_cents = self.fees.fee_on_win_cents(role, price_cents);
        Some(EvResult {
            ticker: pricing.ticker.clone(),
            side: pricing.side,
            scenario,
            ev_per_contract: expected_value(p_win, price_cents, fee_on_win_cents),
        })
    }

    /// Both scenarios, skipping the ones without an executable price.
    pub fn evaluate_all(&self, p_win: f64, pricing: &PricingResult) -> Vec<EvResult> {
        [EvScenario::Take, EvScenario::PostInside]
            .into_iter()
            .filter_map(|scenario| self.evaluate(p_win, pricing, scenario))
            .collect()
    }
}

/// Best EV across scenarios, for ranking. None for an empty slice.
pub fn best_ev(results: &[EvResult]) -> Option<f64> {
    results
        .iter()
        .map(|r| r.ev_per_contract)
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContractSide;

    fn pricing(best: Option<u8>, inside: Option<u8>) -> PricingResult {
        PricingResult {
            ticker: "TEST".to_string(),
            side: ContractSide::Yes,
            best_price: best,
            inside_price: inside,
            taker_break_even: None,
            maker_break_even: None,
            liquidity: 10,
        }
    }

    #[test]
    fn test_negative_ev_taker_example() {
        // p_win 0.60 at 62c, taker fee on win 2c:
        // EV = 0.60 * (0.38 - 0.02) - 0.40 * 0.62 = -0.032
        let engine = EvEngine::default();
        let result = engine
            .evaluate(0.60, &pricing(Some(62), Some(61)), EvScenario::Take)
            .unwrap();
        assert!((result.ev_per_contract + 0.032).abs() < 1e-9);
        // Correctly excluded by a positive-EV filter.
        assert!(result.ev_per_contract < 0.0);
    }

    #[test]
    fn test_ev_strictly_increasing_in_p_win() {
        let engine = EvEngine::default();
        let quote = pricing(Some(55), Some(54));
        let mut last = f64::NEG_INFINITY;
        for i in 1..=99 {
            let p_win = f64::from(i) / 100.0;
            let ev = engine
                .evaluate(p_win, &quote, EvScenario::Take)
                .unwrap()
                .ev_per_contract;
            assert!(ev > last);
            last = ev;
        }
    }

    #[test]
    fn test_missing_prices_yield_no_result() {
        let engine = EvEngine::default();
        assert!(engine.evaluate(0.5, &pricing(None, None), EvScenario::Take).is_none());
        assert!(engine
            .evaluate(0.5, &pricing(Some(1), None), EvScenario::PostInside)
            .is_none());
        assert_eq!(engine.evaluate_all(0.5, &pricing(Some(1), None)).len(), 1);
    }

    #[test]
    fn test_maker_scenario_uses_inside_price() {
        let engine = EvEngine::default();
        let result = engine
            .evaluate(0.60, &pricing(Some(58), Some(57)), EvScenario::PostInside)
            .unwrap();
        // Maker fee at 57c, calibrated: ceil(0.0175*1000*0.57*0.43*100)/1000
        // = 429/1000 = 0.429c per contract.
        let expected = expected_value(0.60, 57, 0.429);
        assert!((result.ev_per_contract - expected).abs() < 1e-12);
        assert_eq!(result.scenario, EvScenario::PostInside);
    }

    #[test]
    fn test_best_ev_ranking() {
        let results = vec![
            EvResult {
                ticker: "A".to_string(),
                side: ContractSide::Yes,
                scenario: EvScenario::Take,
                ev_per_contract: -0.01,
            },
            EvResult {
                ticker: "A".to_string(),
                side: ContractSide::Yes,
                scenario: EvScenario::PostInside,
                ev_per_contract: 0.024,
            },
        ];
        assert!((best_ev(&results).unwrap() - 0.024).abs() < 1e-12);
        assert!(best_ev(&[]).is_none());
    }
}
