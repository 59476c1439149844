//! Per-market RSI mean-reversion state machine: `Flat -> PendingEntry -> InPosition ->
//! PendingExit -> Flat`, with self-healing against observed account state and recovery from
//! partial fills.

use tradebot_core::config::StrategyConfig;
use tradebot_core::{
    Amount, Candle, Identifier, Market, OrderPosition, OrderRequest, OrderSize, OrderStatus,
    OrderType, Price, Volume,
};
use tradebot_indicators::{ChangeVolatilityIndicator, ClosePriceWindow, RsiWilder, Value};
use uuid::Uuid;

use crate::types::{AccountSnapshot, Decision, FillEvent, OrderStatusEvent, PositionSnapshot};

/// Tunable strategy parameters (distinct from the ambient [`StrategyConfig`], which holds
/// cross-cutting thresholds shared by every strategy instance).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyParams {
    pub rsi_length: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub trend_look_window: usize,
    pub max_trend_strength: f64,
    pub volatility_window: usize,
    pub min_volatility: f64,
    /// Percent of available KRW risked per entry, in `0..=100`.
    pub risk_percent: f64,
    pub stop_loss_pct: f64,
    pub profit_target_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Flat,
    PendingEntry,
    InPosition,
    PendingExit,
}

/// Builds the bot's client-order-id prefix, used both to mint fresh identifiers and by
/// `StartupRecovery` to recognize orders this bot placed.
pub fn bot_prefix(strategy_id: &str, market: &str) -> String {
    format!("{strategy_id}:{market}:")
}

/// One mean-reversion strategy instance, owned by a single market's worker thread.
pub struct RsiMeanReversionStrategy {
    strategy_id: String,
    market: Market,
    params: StrategyParams,
    config: StrategyConfig,

    rsi: RsiWilder,
    close_window: ClosePriceWindow,
    volatility: ChangeVolatilityIndicator,

    state: StrategyState,
    entry: Price,
    stop: Price,
    target: Price,

    last_timestamp: Option<String>,

    pending_client_id: Option<Identifier>,
    pending_filled_volume: Volume,
    pending_cost_sum: Amount,
    pending_last_price: Price,
}

impl std::fmt::Debug for RsiMeanReversionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsiMeanReversionStrategy")
            .field("market", &self.market)
            .field("state", &self.state)
            .field("entry", &self.entry)
            .finish()
    }
}

impl RsiMeanReversionStrategy {
    pub fn new(
        strategy_id: impl Into<String>,
        market: impl Into<Market>,
        params: StrategyParams,
        config: StrategyConfig,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            market: market.into(),
            rsi: RsiWilder::new(params.rsi_length),
            close_window: ClosePriceWindow::new(params.trend_look_window),
            volatility: ChangeVolatilityIndicator::new(params.volatility_window),
            params,
            config,
            state: StrategyState::Flat,
            entry: 0.0,
            stop: 0.0,
            target: 0.0,
            last_timestamp: None,
            pending_client_id: None,
            pending_filled_volume: 0.0,
            pending_cost_sum: 0.0,
            pending_last_price: 0.0,
        }
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn entry(&self) -> Price {
        self.entry
    }

    pub fn stop(&self) -> Price {
        self.stop
    }

    pub fn target(&self) -> Price {
        self.target
    }

    fn position_significant(&self, account: &AccountSnapshot, close: Price) -> bool {
        account.coin_available * close >= self.config.min_notional_krw
    }

    fn derive_stops(&self, entry: Price) -> (Price, Price) {
        let stop = (entry * (1.0 - self.params.stop_loss_pct / 100.0)).max(0.0);
        let target = (entry * (1.0 + self.params.profit_target_pct / 100.0)).max(0.0);
        (stop, target)
    }

    fn clear_pending(&mut self) {
        self.pending_client_id = None;
        self.pending_filled_volume = 0.0;
        self.pending_cost_sum = 0.0;
        self.pending_last_price = 0.0;
    }

    fn fresh_identifier(&self, tag: &str) -> Identifier {
        format!("{}{}:{}", bot_prefix(&self.strategy_id, &self.market), tag, Uuid::new_v4())
    }

    /// Feeds one finalized bar. Returns an order intent when the dispatch rule fires.
    pub fn on_candle(&mut self, candle: &Candle, account: &AccountSnapshot) -> Option<Decision> {
        if candle.market != self.market {
            return None;
        }
        if self.last_timestamp.as_deref() == Some(candle.start_timestamp.as_str()) {
            return None;
        }
        self.last_timestamp = Some(candle.start_timestamp.clone());

        let close = candle.close_price;
        let rsi = self.rsi.update(close);
        let close_n = self.close_window.update(close);
        let volatility = self.volatility.update(close);

        let trend_strength = if close_n.ready && close_n.value != 0.0 {
            Some((close - close_n.value).abs() / close_n.value)
        } else {
            None
        };
        let market_ok = rsi.ready
            && volatility.ready
            && volatility.value >= self.params.min_volatility
            && trend_strength.map(|t| t <= self.params.max_trend_strength).unwrap_or(false);

        self.self_heal(account, close);

        let order = match self.state {
            StrategyState::Flat => self.try_enter(account, market_ok, rsi.value),
            StrategyState::InPosition => self.try_exit(account, rsi, close),
            StrategyState::PendingEntry | StrategyState::PendingExit => None,
        };

        order.map(|order| Decision { order: Some(order) })
    }

    fn self_heal(&mut self, account: &AccountSnapshot, close: Price) {
        match self.state {
            StrategyState::PendingEntry => {
                if self.position_significant(account, close) {
                    self.entry = close;
                    let (stop, target) = self.derive_stops(close);
                    self.stop = stop;
                    self.target = target;
                    self.state = StrategyState::InPosition;
                    self.clear_pending();
                }
            }
            StrategyState::PendingExit => {
                if !self.position_significant(account, close) {
                    self.state = StrategyState::Flat;
                    self.entry = 0.0;
                    self.stop = 0.0;
                    self.target = 0.0;
                    self.clear_pending();
                }
            }
            StrategyState::Flat => {
                if self.position_significant(account, close) {
                    self.entry = close;
                    self.stop = 0.0;
                    self.target = 0.0;
                    self.state = StrategyState::InPosition;
                }
            }
            StrategyState::InPosition => {
                if !self.position_significant(account, close) {
                    self.state = StrategyState::Flat;
                    self.entry = 0.0;
                    self.stop = 0.0;
                    self.target = 0.0;
                }
            }
        }
    }

    fn try_enter(&mut self, account: &AccountSnapshot, market_ok: bool, rsi_value: f64) -> Option<OrderRequest> {
        if !(account.can_buy() && market_ok && rsi_value <= self.params.oversold) {
            return None;
        }
        let krw = account.krw_available * self.params.risk_percent / 100.0;
        if krw < self.config.min_notional_krw {
            return None;
        }
        let identifier = self.fresh_identifier("entry");
        let req = OrderRequest {
            market: self.market.clone(),
            position: OrderPosition::Bid,
            kind: OrderType::Market,
            size: OrderSize::Amount(krw),
            price: None,
            strategy_id: self.strategy_id.clone(),
            identifier: identifier.clone(),
            client_tag: "entry".into(),
        };
        self.clear_pending();
        self.pending_client_id = Some(identifier);
        self.state = StrategyState::PendingEntry;
        Some(req)
    }

    fn try_exit(&mut self, account: &AccountSnapshot, rsi: Value<f64>, close: Price) -> Option<OrderRequest> {
        let stop_hit = self.stop > 0.0 && close <= self.stop;
        let target_hit = self.target > 0.0 && close >= self.target;
        let rsi_hit = rsi.ready && rsi.value >= self.params.overbought;
        if !(rsi_hit || stop_hit || target_hit) {
            return None;
        }
        let sell_volume = (account.coin_available - self.config.volume_safety_eps).max(0.0);
        if sell_volume <= 0.0 || sell_volume * close < self.config.min_notional_krw {
            return None;
        }
        let identifier = self.fresh_identifier("exit");
        let req = OrderRequest {
            market: self.market.clone(),
            position: OrderPosition::Ask,
            kind: OrderType::Market,
            size: OrderSize::Volume(sell_volume),
            price: None,
            strategy_id: self.strategy_id.clone(),
            identifier: identifier.clone(),
            client_tag: "exit".into(),
        };
        self.clear_pending();
        self.pending_client_id = Some(identifier);
        self.state = StrategyState::PendingExit;
        Some(req)
    }

    /// Accumulates a partial fill against the pending order. Never changes state.
    pub fn on_fill(&mut self, event: &FillEvent) {
        let Some(pending_id) = &self.pending_client_id else {
            return;
        };
        if pending_id != &event.identifier {
            return;
        }
        self.pending_filled_volume += event.filled_volume;
        self.pending_cost_sum += event.fill_price * event.filled_volume;
        self.pending_last_price = event.fill_price;
    }

    /// Applies a terminal order-status transition against the pending order.
    pub fn on_order_update(&mut self, event: &OrderStatusEvent) {
        let Some(pending_id) = self.pending_client_id.clone() else {
            return;
        };
        if pending_id != event.identifier {
            return;
        }

        match event.status {
            OrderStatus::Rejected | OrderStatus::Canceled => {
                if self.pending_filled_volume <= 0.0 {
                    self.state = match self.state {
                        StrategyState::PendingEntry => StrategyState::Flat,
                        StrategyState::PendingExit => StrategyState::InPosition,
                        other => other,
                    };
                } else {
                    let vwap = self.pending_cost_sum / self.pending_filled_volume;
                    match self.state {
                        StrategyState::PendingEntry => {
                            self.entry = vwap;
                            let (stop, target) = self.derive_stops(vwap);
                            self.stop = stop;
                            self.target = target;
                            self.state = StrategyState::InPosition;
                        }
                        StrategyState::PendingExit => {
                            self.state = StrategyState::InPosition;
                        }
                        _ => {}
                    }
                }
            }
            OrderStatus::Filled => {
                let final_price = if self.pending_filled_volume > 0.0 {
                    self.pending_cost_sum / self.pending_filled_volume
                } else {
                    self.pending_last_price
                };
                match self.state {
                    StrategyState::PendingEntry => {
                        self.entry = final_price;
                        let (stop, target) = self.derive_stops(final_price);
                        self.stop = stop;
                        self.target = target;
                        self.state = StrategyState::InPosition;
                    }
                    StrategyState::PendingExit => {
                        self.state = StrategyState::Flat;
                        self.entry = 0.0;
                        self.stop = 0.0;
                        self.target = 0.0;
                    }
                    _ => {}
                }
            }
            OrderStatus::New | OrderStatus::Open | OrderStatus::Pending => return,
        }
        self.clear_pending();
    }

    /// Synchronous rollback when the engine rejects submission before any websocket event
    /// could arrive.
    pub fn on_submit_failed(&mut self) {
        self.state = match self.state {
            StrategyState::PendingEntry => StrategyState::Flat,
            StrategyState::PendingExit => StrategyState::InPosition,
            other => other,
        };
        self.clear_pending();
    }

    /// One-shot reconciliation against a recovered position snapshot. Clears all pending
    /// state unconditionally.
    pub fn sync_on_start(&mut self, snapshot: &PositionSnapshot) {
        self.clear_pending();
        if snapshot.coin > 0.0 && snapshot.avg_entry_price > 0.0 {
            self.entry = snapshot.avg_entry_price;
            let (stop, target) = self.derive_stops(snapshot.avg_entry_price);
            self.stop = stop;
            self.target = target;
            self.state = StrategyState::InPosition;
        } else {
            self.state = StrategyState::Flat;
            self.entry = 0.0;
            self.stop = 0.0;
            self.target = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> StrategyParams {
        StrategyParams {
            rsi_length: 2,
            oversold: 30.0,
            overbought: 70.0,
            trend_look_window: 1,
            max_trend_strength: 1.0,
            volatility_window: 2,
            min_volatility: 0.0,
            risk_percent: 10.0,
            stop_loss_pct: 2.0,
            profit_target_pct: 4.0,
        }
    }

    fn strategy() -> RsiMeanReversionStrategy {
        RsiMeanReversionStrategy::new("bot", "KRW-BTC", params(), StrategyConfig::default())
    }

    fn candle(close: f64, ts: &str) -> Candle {
        Candle::new("KRW-BTC", close, close, close, close, 1.0, ts)
    }

    fn account(krw: f64, coin: f64) -> AccountSnapshot {
        AccountSnapshot {
            krw_available: krw,
            coin_available: coin,
        }
    }

    #[test]
    fn duplicate_timestamp_is_ignored() {
        let mut s = strategy();
        let acc = account(1_000_000.0, 0.0);
        s.on_candle(&candle(100.0, "t1"), &acc);
        let before = s.state();
        s.on_candle(&candle(50.0, "t1"), &acc);
        assert_eq!(s.state(), before);
    }

    #[test]
    fn flat_enters_on_sustained_decline() {
        let mut s = strategy();
        let acc = account(1_000_000.0, 0.0);
        s.on_candle(&candle(100.0, "t1"), &acc);
        s.on_candle(&candle(90.0, "t2"), &acc);
        let decision = s.on_candle(&candle(80.0, "t3"), &acc);
        assert_eq!(s.state(), StrategyState::PendingEntry);
        let order = decision.unwrap().order.unwrap();
        assert_eq!(order.position, OrderPosition::Bid);
        assert!(matches!(order.size, OrderSize::Amount(a) if (a - 100_000.0).abs() < 1e-6));
    }

    #[test]
    fn on_order_update_filled_sets_in_position_with_stops() {
        let mut s = strategy();
        let acc = account(1_000_000.0, 0.0);
        s.on_candle(&candle(100.0, "t1"), &acc);
        s.on_candle(&candle(90.0, "t2"), &acc);
        s.on_candle(&candle(80.0, "t3"), &acc);
        let identifier = s.pending_client_id.clone().unwrap();

        s.on_fill(&FillEvent {
            identifier: identifier.clone(),
            order_id: "U1".into(),
            trade_id: "T1".into(),
            position: OrderPosition::Bid,
            fill_price: 80.0,
            filled_volume: 1.25,
        });
        s.on_order_update(&OrderStatusEvent {
            identifier,
            order_id: "U1".into(),
            status: OrderStatus::Filled,
            position: OrderPosition::Bid,
            executed_volume: 1.25,
            remaining_volume: 0.0,
        });

        assert_eq!(s.state(), StrategyState::InPosition);
        assert!((s.entry() - 80.0).abs() < 1e-9);
        assert!(s.stop() < 80.0 && s.target() > 80.0);
    }

    #[test]
    fn canceled_after_partial_fill_recovers_vwap_entry() {
        let mut s = strategy();
        let acc = account(1_000_000.0, 0.0);
        s.on_candle(&candle(100.0, "t1"), &acc);
        s.on_candle(&candle(90.0, "t2"), &acc);
        s.on_candle(&candle(80.0, "t3"), &acc);
        let identifier = s.pending_client_id.clone().unwrap();

        s.on_fill(&FillEvent {
            identifier: identifier.clone(),
            order_id: "U1".into(),
            trade_id: "T1".into(),
            position: OrderPosition::Bid,
            fill_price: 50_000_000.0,
            filled_volume: 0.0005,
        });
        s.on_order_update(&OrderStatusEvent {
            identifier,
            order_id: "U1".into(),
            status: OrderStatus::Canceled,
            position: OrderPosition::Bid,
            executed_volume: 0.0005,
            remaining_volume: 0.0,
        });

        assert_eq!(s.state(), StrategyState::InPosition);
        assert!((s.entry() - 50_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn self_heal_detects_externally_acquired_position() {
        let mut s = strategy();
        let acc = account(0.0, 100.0);
        s.on_candle(&candle(100.0, "t1"), &acc);
        assert_eq!(s.state(), StrategyState::InPosition);
        assert_eq!(s.stop(), 0.0);
        assert_eq!(s.target(), 0.0);
    }

    #[test]
    fn sync_on_start_forces_flat_without_a_position() {
        let mut s = strategy();
        s.sync_on_start(&PositionSnapshot {
            coin: 0.0,
            avg_entry_price: 0.0,
        });
        assert_eq!(s.state(), StrategyState::Flat);
    }

    #[test]
    fn sync_on_start_recovers_in_position_with_stops() {
        let mut s = strategy();
        s.sync_on_start(&PositionSnapshot {
            coin: 0.01,
            avg_entry_price: 50_000_000.0,
        });
        assert_eq!(s.state(), StrategyState::InPosition);
        assert!(s.stop() > 0.0 && s.target() > 0.0);
    }

    #[test]
    fn on_submit_failed_rolls_back_pending_entry() {
        let mut s = strategy();
        let acc = account(1_000_000.0, 0.0);
        s.on_candle(&candle(100.0, "t1"), &acc);
        s.on_candle(&candle(90.0, "t2"), &acc);
        s.on_candle(&candle(80.0, "t3"), &acc);
        assert_eq!(s.state(), StrategyState::PendingEntry);
        s.on_submit_failed();
        assert_eq!(s.state(), StrategyState::Flat);
    }
}
