//! `ReservationToken`: a scoped claim on a market's available KRW.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tradebot_core::{Amount, Market};

use crate::manager::Inner;

/// A scoped reservation of `amount` KRW against one market's budget.
///
/// Minted by [`crate::AccountManager::reserve`]. Releases whatever is left of `amount -
/// consumed` back to `available_krw` on [`Drop`], or earlier via an explicit `release`/
/// `finalize_order` call — both paths are idempotent against the `active` flag, so a token
/// is refunded exactly once regardless of which happens first.
///
/// There is deliberately no back-reference cycle: the token holds a plain `Arc` into the
/// ledger's shared inner state, not into the manager itself, and the manager never holds a
/// reference to outstanding tokens.
pub struct ReservationToken {
    inner: Arc<Inner>,
    market: Market,
    amount: Amount,
    consumed: Amount,
    id: u64,
    active: bool,
}

impl ReservationToken {
    pub(crate) fn new(inner: Arc<Inner>, market: Market, amount: Amount, id: u64) -> Self {
        Self {
            inner,
            market,
            amount,
            consumed: 0.0,
            id,
            active: true,
        }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn consumed(&self) -> Amount {
        self.consumed
    }

    /// Amount still available to finalize against (`amount - consumed`, floored at zero).
    pub fn remaining(&self) -> Amount {
        (self.amount - self.consumed).max(0.0)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn add_consumed(&mut self, amount: Amount) {
        self.consumed += amount;
    }

    /// Releases whatever remains back to `available_krw`. No-op if already inactive.
    pub(crate) fn release_internal(&mut self) {
        if !self.active {
            return;
        }
        let remaining = self.remaining();
        if remaining > 0.0 {
            let mut budgets = self.inner.budgets.write();
            if let Some(budget) = budgets.get_mut(&self.market) {
                budget.reserved_krw = (budget.reserved_krw - remaining).max(0.0);
                budget.available_krw += remaining;
            }
        }
        self.active = false;
        self.inner.stats.releases.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for ReservationToken {
    fn drop(&mut self) {
        self.release_internal();
    }
}

impl std::fmt::Debug for ReservationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationToken")
            .field("market", &self.market)
            .field("amount", &self.amount)
            .field("consumed", &self.consumed)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::manager::AccountManager;
    use tradebot_core::config::AccountConfig;
    use tradebot_core::{Account, Position};

    fn manager_with_budget(available: f64) -> AccountManager {
        let acct = Account {
            id: "a".into(),
            positions: vec![Position {
                currency: "KRW".into(),
                free: available,
                avg_buy_price: 0.0,
                unit_currency: "KRW".into(),
            }],
        };
        AccountManager::new(&["KRW-BTC".to_string()], &acct, AccountConfig::default())
    }

    #[test]
    fn drop_without_explicit_release_refunds_remaining() {
        let mgr = manager_with_budget(1_000_000.0);
        {
            let _token = mgr.reserve("KRW-BTC", 200_000.0).unwrap();
            assert_eq!(mgr.get_budget("KRW-BTC").unwrap().available_krw, 800_000.0);
        }
        assert_eq!(mgr.get_budget("KRW-BTC").unwrap().available_krw, 1_000_000.0);
        assert_eq!(mgr.get_budget("KRW-BTC").unwrap().reserved_krw, 0.0);
    }

    #[test]
    fn explicit_release_then_drop_only_refunds_once() {
        let mgr = manager_with_budget(1_000_000.0);
        let token = mgr.reserve("KRW-BTC", 200_000.0).unwrap();
        mgr.release(token);
        assert_eq!(mgr.get_budget("KRW-BTC").unwrap().available_krw, 1_000_000.0);
    }
}
