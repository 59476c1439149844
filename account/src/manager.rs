//! `AccountManager`: capital ledger with scoped reservations and fill accounting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tradebot_core::config::AccountConfig;
use tradebot_core::{base_of, quote_of, Account, Amount, Market, Price, Volume};

use crate::budget::MarketBudget;
use crate::token::ReservationToken;

/// Atomic operation counters, read via [`AccountManager::stats`].
#[derive(Debug, Default)]
pub struct Stats {
    pub reserves: AtomicU64,
    pub releases: AtomicU64,
    pub fills_buy: AtomicU64,
    pub fills_sell: AtomicU64,
    pub reserve_failures: AtomicU64,
}

/// Plain snapshot of [`Stats`] for assertions in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub reserves: u64,
    pub releases: u64,
    pub fills_buy: u64,
    pub fills_sell: u64,
    pub reserve_failures: u64,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reserves: self.reserves.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            fills_buy: self.fills_buy.load(Ordering::Relaxed),
            fills_sell: self.fills_sell.load(Ordering::Relaxed),
            reserve_failures: self.reserve_failures.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct Inner {
    pub(crate) config: AccountConfig,
    pub(crate) budgets: RwLock<HashMap<Market, MarketBudget>>,
    pub(crate) stats: Stats,
    next_token_id: AtomicU64,
}

impl Inner {
    fn next_token_id(&self) -> u64 {
        self.next_token_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Thread-safe per-market budget ledger. Cheap to clone (wraps an `Arc`); every clone shares
/// the same ledger.
#[derive(Clone)]
pub struct AccountManager {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for AccountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountManager").finish_non_exhaustive()
    }
}

impl AccountManager {
    /// Builds one `MarketBudget` per market from an exchange account snapshot, per the
    /// construction rule in §4.2: positions worth at least `init_dust_threshold_krw` occupy
    /// their market; the rest of the quote-currency balance is split evenly across markets
    /// holding no coin.
    pub fn new(markets: &[Market], snapshot: &Account, config: AccountConfig) -> Self {
        let budgets = markets
            .iter()
            .map(|m| (m.clone(), MarketBudget::flat(m.clone())))
            .collect();
        let mgr = Self {
            inner: Arc::new(Inner {
                config,
                budgets: RwLock::new(budgets),
                stats: Stats::default(),
                next_token_id: AtomicU64::new(1),
            }),
        };
        mgr.sync_with_account(snapshot);
        mgr
    }

    pub fn get_budget(&self, market: &str) -> Option<MarketBudget> {
        self.inner.budgets.read().get(market).cloned()
    }

    pub fn snapshot(&self) -> HashMap<Market, MarketBudget> {
        self.inner.budgets.read().clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Attempts to reserve `amount` of `market`'s available KRW. Fails (bumping
    /// `reserve_failures`) if `amount <= 0`, the market is unregistered, or there isn't
    /// enough available balance.
    pub fn reserve(&self, market: &str, amount: Amount) -> Option<ReservationToken> {
        if amount <= 0.0 {
            self.inner.stats.reserve_failures.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let mut budgets = self.inner.budgets.write();
        let Some(budget) = budgets.get_mut(market) else {
            self.inner.stats.reserve_failures.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        if budget.available_krw < amount {
            self.inner.stats.reserve_failures.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        budget.available_krw -= amount;
        budget.reserved_krw += amount;
        drop(budgets);

        self.inner.stats.reserves.fetch_add(1, Ordering::Relaxed);
        Some(ReservationToken::new(
            Arc::clone(&self.inner),
            market.to_string(),
            amount,
            self.inner.next_token_id(),
        ))
    }

    /// Refunds whatever is left of `token` back to `available_krw`. Idempotent: releasing an
    /// already-released (or already-finalized) token does nothing.
    pub fn release(&self, mut token: ReservationToken) {
        token.release_internal();
    }

    /// Applies a BUY fill against `token`. No-op if the token is inactive or any input is
    /// non-positive. Clamps `executed_krw` to the token's remaining reservation, recomputes
    /// the volume-weighted average entry price, and marks the clamped amount consumed.
    pub fn finalize_fill_buy(
        &self,
        token: &mut ReservationToken,
        executed_krw: Amount,
        received_coin: Volume,
        fill_price: Price,
    ) {
        if !token.is_active() || executed_krw <= 0.0 || received_coin <= 0.0 || fill_price <= 0.0 {
            return;
        }
        let clamped = executed_krw.min(token.remaining());

        {
            let mut budgets = self.inner.budgets.write();
            if let Some(budget) = budgets.get_mut(token.market()) {
                budget.reserved_krw = (budget.reserved_krw - clamped).max(0.0);
                let old_value = budget.coin_balance * budget.avg_entry_price;
                let new_value = received_coin * fill_price;
                let new_balance = budget.coin_balance + received_coin;
                budget.avg_entry_price = if new_balance > 0.0 {
                    (old_value + new_value) / new_balance
                } else {
                    0.0
                };
                budget.coin_balance = new_balance;
            }
        }

        token.add_consumed(clamped);
        self.inner.stats.fills_buy.fetch_add(1, Ordering::Relaxed);
    }

    /// Applies a SELL fill. Detects oversell (`sold_coin > coin_balance`) and scales the
    /// credited KRW proportionally to what was actually held. Clears the position to zero
    /// (and realizes P&L) once the remaining coin is dust by quantity or value.
    pub fn finalize_fill_sell(&self, market: &str, sold_coin: Volume, received_krw: Amount) {
        if sold_coin <= 0.0 || received_krw <= 0.0 {
            return;
        }
        let mut budgets = self.inner.budgets.write();
        let Some(budget) = budgets.get_mut(market) else {
            return;
        };

        let (actual_sold, credited_krw) = if sold_coin > budget.coin_balance {
            let held_fraction = if sold_coin > 0.0 {
                budget.coin_balance / sold_coin
            } else {
                0.0
            };
            (budget.coin_balance, received_krw * held_fraction)
        } else {
            (sold_coin, received_krw)
        };

        budget.coin_balance = (budget.coin_balance - actual_sold).max(0.0);
        budget.available_krw += credited_krw;

        let dust_by_qty = budget.coin_balance < self.inner.config.coin_epsilon;
        let dust_by_value =
            budget.coin_balance * budget.avg_entry_price < self.inner.config.init_dust_threshold_krw;
        if dust_by_qty || dust_by_value {
            budget.coin_balance = 0.0;
            budget.avg_entry_price = 0.0;
            budget.realized_pnl = budget.available_krw - budget.initial_capital;
        }

        drop(budgets);
        self.inner.stats.fills_sell.fetch_add(1, Ordering::Relaxed);
    }

    /// Releases whatever remains of `token`, then sweeps any leftover `reserved_krw` dust
    /// (below `krw_dust_threshold`) back into `available_krw`.
    pub fn finalize_order(&self, mut token: ReservationToken) {
        let market = token.market().to_string();
        token.release_internal();

        let mut budgets = self.inner.budgets.write();
        if let Some(budget) = budgets.get_mut(&market) {
            if budget.reserved_krw > 0.0 && budget.reserved_krw < self.inner.config.krw_dust_threshold {
                budget.available_krw += budget.reserved_krw;
                budget.reserved_krw = 0.0;
            }
        }
    }

    /// Atomically re-syncs every budget against a fresh exchange account snapshot.
    ///
    /// 1. Zero every budget's coin fields.
    /// 2. For each snapshot position worth at least `init_dust_threshold_krw`, occupy the
    ///    matching market.
    /// 3. Redistribute the quote-currency free balance evenly across markets left at zero
    ///    coin, preserving the "coin xor krw" invariant.
    ///
    /// Assumes every managed market shares the same quote currency (true for a
    /// single-exchange KRW-quoted deployment); the quote is taken from whichever zero-coin
    /// market is inspected first.
    pub fn sync_with_account(&self, snapshot: &Account) {
        let mut budgets = self.inner.budgets.write();

        for budget in budgets.values_mut() {
            budget.coin_balance = 0.0;
            budget.avg_entry_price = 0.0;
        }

        let markets: Vec<Market> = budgets.keys().cloned().collect();
        for market in &markets {
            let Some((base, quote)) = base_of(market).zip(quote_of(market)) else {
                continue;
            };
            let Some(position) = snapshot
                .positions
                .iter()
                .find(|p| p.currency == base && p.unit_currency == quote)
            else {
                continue;
            };
            let value = position.free * position.avg_buy_price;
            if value < self.inner.config.init_dust_threshold_krw {
                continue;
            }
            if let Some(budget) = budgets.get_mut(market) {
                budget.coin_balance = position.free;
                budget.avg_entry_price = position.avg_buy_price;
                budget.available_krw = 0.0;
                budget.reserved_krw = 0.0;
                if budget.initial_capital <= 0.0 {
                    budget.initial_capital = value;
                }
            }
        }

        let zero_coin_markets: Vec<Market> = budgets
            .iter()
            .filter(|(_, b)| b.coin_balance < self.inner.config.coin_epsilon)
            .map(|(m, _)| m.clone())
            .collect();
        if let Some(quote) = zero_coin_markets.first().and_then(|m| quote_of(m)) {
            let free = snapshot
                .positions
                .iter()
                .find(|p| p.currency == quote)
                .map(|p| p.free)
                .unwrap_or(0.0);
            let share = free / zero_coin_markets.len() as f64;
            for market in &zero_coin_markets {
                if let Some(budget) = budgets.get_mut(market) {
                    budget.available_krw = share;
                    budget.reserved_krw = 0.0;
                    if budget.initial_capital <= 0.0 {
                        budget.initial_capital = share;
                    }
                }
            }
        }
    }
}
