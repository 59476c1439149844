//! Startup reconciliation: before a market's worker starts trading, cancel whatever this bot
//! left open from a previous run and hand the strategy its actual position.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use tradebot_core::config::RecoveryConfig;
use tradebot_core::{base_of, quote_of, Account, Order};
use tradebot_engine::{MarketEngine, SharedOrderApi};
use tradebot_strategies::{PositionSnapshot, RsiMeanReversionStrategy};

/// Cancels stale bot orders and seeds the strategy's position state from the live account.
#[derive(Debug, Clone)]
pub struct StartupRecovery {
    config: RecoveryConfig,
}

impl StartupRecovery {
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    /// Runs the full sequence for one market. Errors are the caller's to log; recovery
    /// failing does not block the worker from starting; it just starts from whatever state
    /// it could reconcile.
    pub fn run(
        &self,
        engine: &mut MarketEngine,
        strategy: &mut RsiMeanReversionStrategy,
        api: &SharedOrderApi,
        market: &str,
        account: &Account,
        bot_prefix: &str,
    ) {
        if let Err(err) = self.cancel_stale_orders(api, market, bot_prefix) {
            warn!(market, error = %err, "failed to fully cancel stale bot orders during recovery");
        }
        let snapshot = Self::build_position_snapshot(market, account);
        info!(market, coin = snapshot.coin, entry = snapshot.avg_entry_price, "recovered position");
        strategy.sync_on_start(&snapshot);
        let _ = engine;
    }

    /// Cancels every open order tagged with this bot's client-id prefix, then re-polls up to
    /// `verify_retry` times to confirm none remain open.
    fn cancel_stale_orders(&self, api: &SharedOrderApi, market: &str, bot_prefix: &str) -> Result<(), String> {
        let open = api
            .get_open_orders(market)
            .map_err(|e| format!("get_open_orders failed: {e}"))?;
        let stale: Vec<Order> = open
            .into_iter()
            .filter(|o| o.identifier.as_deref().is_some_and(|id| id.starts_with(bot_prefix)))
            .collect();

        for order in &stale {
            let mut attempts = 0;
            loop {
                attempts += 1;
                match api.cancel_order(Some(&order.id), order.identifier.as_deref()) {
                    Ok(true) => break,
                    Ok(false) | Err(_) if attempts < self.config.cancel_retry => {
                        thread::sleep(Duration::from_millis(50));
                        continue;
                    }
                    Ok(false) => {
                        return Err(format!("cancel of order {} did not confirm", order.id));
                    }
                    Err(err) => return Err(format!("cancel of order {} failed: {err}", order.id)),
                }
            }
        }

        for attempt in 0..self.config.verify_retry {
            let still_open = api
                .get_open_orders(market)
                .map_err(|e| format!("get_open_orders failed during verify: {e}"))?;
            let remaining = still_open
                .iter()
                .any(|o| o.identifier.as_deref().is_some_and(|id| id.starts_with(bot_prefix)));
            if !remaining {
                return Ok(());
            }
            if attempt + 1 < self.config.verify_retry {
                thread::sleep(Duration::from_millis(50));
            }
        }
        Err("bot orders still open after verify retries".to_string())
    }

    /// Finds the account position matching this market's base/quote pair, defaulting to a
    /// flat snapshot if the exchange reports no balance for it.
    fn build_position_snapshot(market: &str, account: &Account) -> PositionSnapshot {
        let Some((base, quote)) = base_of(market).zip(quote_of(market)) else {
            return PositionSnapshot {
                coin: 0.0,
                avg_entry_price: 0.0,
            };
        };
        account
            .positions
            .iter()
            .find(|p| p.currency == base && p.unit_currency == quote)
            .map(|p| PositionSnapshot {
                coin: p.free,
                avg_entry_price: p.avg_buy_price,
            })
            .unwrap_or(PositionSnapshot {
                coin: 0.0,
                avg_entry_price: 0.0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradebot_core::Position;

    #[test]
    fn snapshot_defaults_to_flat_when_no_matching_position() {
        let account = Account {
            id: "a".into(),
            positions: vec![],
        };
        let snap = StartupRecovery::build_position_snapshot("KRW-BTC", &account);
        assert_eq!(snap.coin, 0.0);
        assert_eq!(snap.avg_entry_price, 0.0);
    }

    #[test]
    fn snapshot_recovers_matching_position() {
        let account = Account {
            id: "a".into(),
            positions: vec![Position {
                currency: "BTC".into(),
                free: 0.01,
                avg_buy_price: 50_000_000.0,
                unit_currency: "KRW".into(),
            }],
        };
        let snap = StartupRecovery::build_position_snapshot("KRW-BTC", &account);
        assert_eq!(snap.coin, 0.01);
        assert_eq!(snap.avg_entry_price, 50_000_000.0);
    }
}
