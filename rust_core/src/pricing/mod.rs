//! Order-book pricing over bid-only books.
//!
//! The exchange publishes resting bids for both contract sides and no asks.
//! The ask for a side is always derived from the opposing side's bids:
//! `ask = 100 - opposing_bid_price`. An empty opposing side means "no
//! opportunity", never an error.

pub mod fees;
pub mod odds;

pub use fees::{FeeRole, FeeSchedule};

use serde::{Deserialize, Serialize};

use crate::models::ContractSide;
use crate::types::{OrderbookSnapshot, PriceLevel, PricingResult};

/// Maker-side quote for one contract side: the resting top-of-book bid and
/// the one-cent queue-jump above it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MakerQuote {
    /// Top resting bid on this side, cents.
    pub bid_cents: Option<u8>,
    /// Size resting at the top bid.
    pub liquidity: u32,
    /// Maker break-even probability at the top bid.
    pub break_even: Option<f64>,
    /// Top bid + 1 cent, None when it would cross the derived ask or leave
    /// the quotable range.
    pub jump_cents: Option<u8>,
    /// Maker break-even probability at the queue-jump price.
    pub jump_break_even: Option<f64>,
    /// True when the one-cent jump would cross the derived ask.
    pub crossed: bool,
}

/// Derives executable prices and break-even probabilities from bid-only
/// books under a fee schedule.
#[derive(Debug, Clone, Default)]
pub struct OrderbookPricer {
    fees: FeeSchedule,
}

impl OrderbookPricer {
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// All derived asks for a side, (price, size) ascending by price. Sizes
    /// are the opposing bids' sizes.
    pub fn derived_asks(&self, book: &OrderbookSnapshot, side: ContractSide) -> Vec<PriceLevel> {
        let mut asks: Vec<PriceLevel> = book
            .bids(side.opposite())
            .iter()
            .filter(|l| l.price >= 1 && l.price <= 99)
            .map(|l| PriceLevel { price: 100 - l.price, size: l.size })
            .collect();
        asks.sort_by_key(|l| l.price);
        asks
    }

    /// Taker-perspective pricing for one side.
    ///
    /// best ask = 100 - max(opposing bid); inside = best ask - 1, floored at
    /// one cent. Liquidity is the size at the opposing best bid. A book with
    /// no opposing bids prices to None with zero liquidity.
    pub fn price(&self, book: &OrderbookSnapshot, side: ContractSide) -> PricingResult {
        let opposing_top = book.best_bid(side.opposite());

        let (best_price, liquidity) = match opposing_top {
            Some(level) => (Some(100 - level.price), level.size),
            None => (None, 0),
        };

        let inside_price = best_price.and_then(|ask| if ask >= 2 { Some(ask - 1) } else { None });

        let taker_break_even = best_price.and_then(|p| self.fees.break_even(FeeRole::Taker, p));
        let maker_break_even = inside_price.and_then(|p| self.fees.break_even(FeeRole::Maker, p));

        PricingResult {
            ticker: book.ticker.clone(),
            side,
            best_price,
            inside_price,
            taker_break_even,
            maker_break_even,
            liquidity,
        }
    }

    /// Maker-perspective quote for one side: the resting top bid with its
    /// break-even, plus the one-cent queue-jump checked against the derived
    /// ask so a posted jump can never cross.
    pub fn maker_quote(&self, book: &OrderbookSnapshot, side: ContractSide) -> MakerQuote {
        let top = match book.best_bid(side) {
            Some(level) => level,
            None => return MakerQuote::default(),
        };

        let derived_ask = book.best_bid(side.opposite()).map(|l| 100 - l.price);

        let mut crossed = false;
        let jump_cents = if top.price < 99 {
            let jump = top.price + 1;
            match derived_ask {
                Some(ask) if jump >= ask => {
                    crossed = true;
                    None
                }
                _ => Some(jump),
            }
        } else {
            None
        };

        MakerQuote {
            bid_cents: Some(top.price),
            liquidity: top.size,
            break_even: self.fees.break_even(FeeRole::Maker, top.price),
            jump_cents,
            jump_break_even: jump_cents.and_then(|p| self.fees.break_even(FeeRole::Maker, p)),
            crossed,
        }
    }
}
