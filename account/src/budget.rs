//! Per-market capital ledger entry.

use tradebot_core::{Amount, Market, Price};

/// A single market's slice of the account: available/reserved KRW, held coin, and realized
/// P&L. At steady state either `coin_balance ≈ 0` (flat) or `available_krw ≈ 0`
/// (in-position) — never both meaningfully nonzero.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketBudget {
    pub market: Market,
    pub available_krw: Amount,
    pub reserved_krw: Amount,
    pub coin_balance: f64,
    pub avg_entry_price: Price,
    pub initial_capital: Amount,
    pub realized_pnl: Amount,
}

impl MarketBudget {
    pub fn flat(market: impl Into<Market>) -> Self {
        Self {
            market: market.into(),
            available_krw: 0.0,
            reserved_krw: 0.0,
            coin_balance: 0.0,
            avg_entry_price: 0.0,
            initial_capital: 0.0,
            realized_pnl: 0.0,
        }
    }

    /// Mark-to-market value of this market's slice at `last_price`.
    pub fn current_equity(&self, last_price: Price) -> Amount {
        self.available_krw + self.reserved_krw + self.coin_balance * last_price
    }

    /// Unrealized + realized return relative to `initial_capital`.
    pub fn roi(&self, last_price: Price) -> f64 {
        if self.initial_capital <= 0.0 {
            0.0
        } else {
            (self.current_equity(last_price) - self.initial_capital) / self.initial_capital
        }
    }

    /// Realized-only return relative to `initial_capital`.
    pub fn realized_roi(&self) -> f64 {
        if self.initial_capital <= 0.0 {
            0.0
        } else {
            self.realized_pnl / self.initial_capital
        }
    }
}
