//! `MarketEngine`: per-market order-lifecycle state machine.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tradebot_account::{AccountManager, ReservationToken};
use tradebot_core::config::EngineConfig;
use tradebot_core::{
    EngineError, Market, MyTrade, Order, OrderId, OrderPosition, OrderRequest, OrderSize,
    OrderStatus, OrderType, TradeId,
};

use crate::events::{EngineEvent, EngineFillEvent, EngineOrderStatusEvent};
use crate::order_api::SharedOrderApi;
use crate::order_store::OrderStore;

/// Owns one market's order lifecycle: reservations, the active BID/ASK slots, the trade
/// dedupe set, and the outbound event queue. Exclusively owned by one worker thread —
/// [`bind_to_current_thread`](Self::bind_to_current_thread) captures that thread's id, and
/// every other public method asserts it is still being called from it. A violation is a
/// programming error and panics rather than corrupting state silently.
pub struct MarketEngine {
    market: Market,
    api: Arc<SharedOrderApi>,
    store: Arc<OrderStore>,
    account: AccountManager,
    config: EngineConfig,

    owner_thread: Option<ThreadId>,

    seen_trade_ids: HashSet<TradeId>,
    seen_trade_fifo: VecDeque<TradeId>,

    events: VecDeque<EngineEvent>,

    active_buy_token: Option<ReservationToken>,
    active_buy_order_id: OrderId,
    active_sell_order_id: OrderId,

    completed_count: u64,
}

impl std::fmt::Debug for MarketEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketEngine")
            .field("market", &self.market)
            .field("has_active_buy", &self.active_buy_token.is_some())
            .field("active_sell_order_id", &self.active_sell_order_id)
            .finish()
    }
}

impl MarketEngine {
    pub fn new(
        market: Market,
        api: Arc<SharedOrderApi>,
        store: Arc<OrderStore>,
        account: AccountManager,
        config: EngineConfig,
    ) -> Self {
        Self {
            market,
            api,
            store,
            account,
            config,
            owner_thread: None,
            seen_trade_ids: HashSet::new(),
            seen_trade_fifo: VecDeque::new(),
            events: VecDeque::new(),
            active_buy_token: None,
            active_buy_order_id: String::new(),
            active_sell_order_id: String::new(),
            completed_count: 0,
        }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    /// Captures the calling thread as this engine's sole owner. Must be called once, from
    /// the worker thread, before any other method.
    pub fn bind_to_current_thread(&mut self) {
        self.owner_thread = Some(thread::current().id());
    }

    fn assert_owner(&self) {
        match self.owner_thread {
            Some(owner) if owner == thread::current().id() => {}
            Some(_) => panic!("MarketEngine({}) accessed from the wrong thread", self.market),
            None => panic!("MarketEngine({}) used before bind_to_current_thread", self.market),
        }
    }

    /// Validates, reserves (if BID), posts and records a new order.
    pub fn submit(&mut self, req: &OrderRequest) -> Result<Order, EngineError> {
        self.assert_owner();
        Self::validate_request(req)?;
        if req.market != self.market {
            return Err(EngineError::MarketNotSupported);
        }

        let mut reservation: Option<ReservationToken> = None;
        match req.position {
            OrderPosition::Bid => {
                if self.active_buy_token.is_some() {
                    return Err(EngineError::OrderRejected(
                        "already has pending buy order".into(),
                    ));
                }
                if !self.active_sell_order_id.is_empty() {
                    return Err(EngineError::OrderRejected(
                        "cannot submit buy while sell order is active".into(),
                    ));
                }
                let amount = Self::compute_reserve_amount(req, self.config.reserve_margin);
                let token = self
                    .account
                    .reserve(&self.market, amount)
                    .ok_or(EngineError::InsufficientFunds)?;
                reservation = Some(token);
            }
            OrderPosition::Ask => {
                if !self.active_sell_order_id.is_empty() {
                    return Err(EngineError::OrderRejected(
                        "already has pending sell order".into(),
                    ));
                }
                if self.active_buy_token.is_some() {
                    return Err(EngineError::OrderRejected(
                        "cannot submit sell while buy order is active".into(),
                    ));
                }
            }
        }

        let order_id = match self.api.post_order(req) {
            Ok(id) if !id.is_empty() => id,
            _ => {
                if let Some(token) = reservation.take() {
                    self.account.release(token);
                }
                return Err(EngineError::InternalError("postOrder failed".into()));
            }
        };

        let (volume, remaining_volume) = match req.size {
            OrderSize::Volume(v) => (Some(v), v),
            OrderSize::Amount(_) => (None, 0.0),
        };

        match req.position {
            OrderPosition::Bid => {
                self.active_buy_token = reservation;
                self.active_buy_order_id = order_id.clone();
            }
            OrderPosition::Ask => {
                self.active_sell_order_id = order_id.clone();
            }
        }

        let order = Order {
            market: self.market.clone(),
            identifier: Some(req.identifier.clone()),
            id: order_id,
            position: req.position,
            kind: req.kind,
            price: req.price,
            volume,
            executed_volume: 0.0,
            remaining_volume,
            trades_count: 0,
            reserved_fee: 0.0,
            paid_fee: 0.0,
            remaining_fee: 0.0,
            locked: 0.0,
            executed_funds: 0.0,
            status: OrderStatus::Pending,
            created_at: String::new(),
        };
        self.store.upsert(order.clone());
        Ok(order)
    }

    fn validate_request(req: &OrderRequest) -> Result<(), EngineError> {
        if req.market.is_empty() {
            return Err(EngineError::InvalidArgument("market must not be empty".into()));
        }
        match req.kind {
            OrderType::Limit => {
                let price = req
                    .price
                    .ok_or_else(|| EngineError::InvalidArgument("limit order requires a price".into()))?;
                if price <= 0.0 {
                    return Err(EngineError::InvalidArgument("price must be positive".into()));
                }
                match req.size {
                    OrderSize::Volume(v) if v > 0.0 => {}
                    _ => {
                        return Err(EngineError::InvalidArgument(
                            "limit order requires a positive volume size".into(),
                        ))
                    }
                }
            }
            OrderType::Market => {
                if req.price.is_some() {
                    return Err(EngineError::InvalidArgument(
                        "market order must not specify a price".into(),
                    ));
                }
                match (req.position, req.size) {
                    (OrderPosition::Bid, OrderSize::Amount(a)) if a > 0.0 => {}
                    (OrderPosition::Ask, OrderSize::Volume(v)) if v > 0.0 => {}
                    _ => {
                        return Err(EngineError::InvalidArgument(
                            "market BID requires an amount size, ASK requires a volume size".into(),
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    fn compute_reserve_amount(req: &OrderRequest, margin: f64) -> f64 {
        match req.size {
            OrderSize::Amount(a) => a * margin,
            OrderSize::Volume(v) => req.price.unwrap_or(0.0) * v * margin,
        }
    }

    /// Applies a private fill: dedupes, emits a `Fill` event, and mutates the ledger.
    pub fn on_my_trade(&mut self, trade: &MyTrade) {
        self.assert_owner();
        if trade.market != self.market {
            return;
        }
        let key = Self::make_trade_dedupe_key(trade);
        if self.mark_trade_once(key) {
            return;
        }

        let Some(stored) = self.store.get(&trade.order_id) else {
            tracing::debug!(order_id = %trade.order_id, market = %self.market, "dropping trade for unknown order");
            return;
        };

        if let Some(identifier) = trade.identifier.clone().or(stored.identifier.clone()) {
            self.push_event(EngineEvent::Fill(EngineFillEvent {
                identifier,
                order_id: trade.order_id.clone(),
                trade_id: trade.trade_id.clone(),
                position: trade.side,
                fill_price: trade.price,
                filled_volume: trade.volume,
            }));
        }

        match trade.side {
            OrderPosition::Bid => {
                if self.active_buy_order_id == trade.order_id && self.active_buy_token.is_some() {
                    let mut token = self.active_buy_token.take().expect("checked is_some above");
                    self.account
                        .finalize_fill_buy(&mut token, trade.executed_funds + trade.fee, trade.volume, trade.price);
                    self.active_buy_token = Some(token);
                } else {
                    tracing::debug!(order_id = %trade.order_id, "BID fill drop: no matching active reservation");
                }
            }
            OrderPosition::Ask => {
                let net = (trade.executed_funds - trade.fee).max(0.0);
                self.account.finalize_fill_sell(&self.market, trade.volume, net);
            }
        }
    }

    fn make_trade_dedupe_key(trade: &MyTrade) -> TradeId {
        if !trade.trade_id.is_empty() {
            return trade.trade_id.clone();
        }
        format!(
            "FALLBACK|{}|{:?}|{}|{:.12}|{:.12}|{:.12}|{:.12}|{}",
            trade.order_id,
            trade.side,
            trade.market,
            trade.price,
            trade.volume,
            trade.executed_funds,
            trade.fee,
            trade.identifier.as_deref().unwrap_or(""),
        )
    }

    /// Returns `true` if `key` had already been seen (caller should drop the event).
    fn mark_trade_once(&mut self, key: TradeId) -> bool {
        if self.seen_trade_ids.contains(&key) {
            return true;
        }
        self.seen_trade_ids.insert(key.clone());
        self.seen_trade_fifo.push_back(key);
        if self.seen_trade_fifo.len() > self.config.max_seen_trades {
            if let Some(oldest) = self.seen_trade_fifo.pop_front() {
                self.seen_trade_ids.remove(&oldest);
            }
        }
        false
    }

    /// Applies an order-status transition reported without a full snapshot.
    pub fn on_order_status(&mut self, order_id: &str, status: OrderStatus) {
        self.assert_owner();
        let Some(mut order) = self.store.get(order_id) else {
            return;
        };
        if order.market != self.market {
            return;
        }
        let old_status = order.status;
        order.status = status;
        if status == OrderStatus::Filled {
            order.remaining_volume = 0.0;
        }
        self.store.update(order.clone());

        if old_status.is_open() && status.is_done() {
            self.on_terminal_transition(&order);
        }
    }

    /// Applies an authoritative order snapshot from the exchange.
    pub fn on_order_snapshot(&mut self, snapshot: Order) {
        self.assert_owner();
        if !snapshot.market.is_empty() && snapshot.market != self.market {
            return;
        }
        let Some(existing) = self.store.get(&snapshot.id) else {
            self.store.upsert(snapshot);
            return;
        };

        let old_status = existing.status;
        let mut updated = existing.clone();
        updated.executed_volume = snapshot.executed_volume;
        updated.remaining_volume = snapshot.remaining_volume;
        updated.trades_count = snapshot.trades_count;
        updated.reserved_fee = snapshot.reserved_fee;
        updated.paid_fee = snapshot.paid_fee;
        updated.remaining_fee = snapshot.remaining_fee;
        updated.locked = snapshot.locked;
        updated.executed_funds = snapshot.executed_funds;
        updated.status = snapshot.status;
        if snapshot.price.is_some() {
            updated.price = snapshot.price;
        }
        if snapshot.volume.is_some() {
            updated.volume = snapshot.volume;
        }
        if !snapshot.created_at.is_empty() {
            updated.created_at = snapshot.created_at;
        }
        updated.identifier = snapshot.identifier.or(existing.identifier);

        self.store.update(updated.clone());

        if old_status.is_open() && updated.status.is_done() && old_status != updated.status {
            if let Some(identifier) = updated.identifier.clone() {
                self.push_event(EngineEvent::Status(EngineOrderStatusEvent {
                    identifier,
                    order_id: updated.id.clone(),
                    status: updated.status,
                    position: updated.position,
                    executed_volume: updated.executed_volume,
                    remaining_volume: updated.remaining_volume,
                }));
            }
            self.on_terminal_transition(&updated);
        }
    }

    fn on_terminal_transition(&mut self, order: &Order) {
        match order.position {
            OrderPosition::Bid if self.active_buy_order_id == order.id => {
                self.finalize_buy_token(&order.id);
            }
            OrderPosition::Ask if self.active_sell_order_id == order.id => {
                self.active_sell_order_id.clear();
            }
            _ => {}
        }
        self.completed_count += 1;
        if self.completed_count % self.config.cleanup_every == 0 {
            self.store.cleanup();
        }
    }

    fn finalize_buy_token(&mut self, order_id: &str) {
        if self.active_buy_order_id != order_id {
            tracing::debug!(order_id, active = %self.active_buy_order_id, "finalize_buy_token: id mismatch");
            return;
        }
        if let Some(token) = self.active_buy_token.take() {
            self.account.finalize_order(token);
        }
        self.active_buy_order_id.clear();
    }

    fn push_event(&mut self, event: EngineEvent) {
        self.events.push_back(event);
    }

    /// Drains and returns every event queued since the last call.
    pub fn poll_events(&mut self) -> Vec<EngineEvent> {
        self.assert_owner();
        self.events.drain(..).collect()
    }

    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.store.get(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradebot_core::{Account, OrderSize, Position};

    struct StubApi {
        next_id: String,
        fail: bool,
    }
    impl crate::order_api::OrderApi for StubApi {
        fn get_my_account(&mut self) -> Result<Account, tradebot_core::RestError> {
            Ok(Account { id: "a".into(), positions: vec![] })
        }
        fn get_open_orders(&mut self, _market: &str) -> Result<Vec<Order>, tradebot_core::RestError> {
            Ok(vec![])
        }
        fn cancel_order(&mut self, _order_id: Option<&str>, _identifier: Option<&str>) -> Result<bool, tradebot_core::RestError> {
            Ok(true)
        }
        fn post_order(&mut self, _request: &OrderRequest) -> Result<OrderId, tradebot_core::RestError> {
            if self.fail {
                Err(tradebot_core::RestError::Timeout)
            } else {
                Ok(self.next_id.clone())
            }
        }
    }

    fn engine(api_fail: bool, available_krw: f64) -> MarketEngine {
        let account = AccountManager::new(
            &["KRW-BTC".to_string()],
            &Account {
                id: "a".into(),
                positions: vec![Position {
                    currency: "KRW".into(),
                    free: available_krw,
                    avg_buy_price: 0.0,
                    unit_currency: "KRW".into(),
                }],
            },
            Default::default(),
        );
        let mut e = MarketEngine::new(
            "KRW-BTC".into(),
            Arc::new(SharedOrderApi::new(Box::new(StubApi {
                next_id: "U1".into(),
                fail: api_fail,
            }))),
            Arc::new(OrderStore::default()),
            account,
            EngineConfig::default(),
        );
        e.bind_to_current_thread();
        e
    }

    fn bid_request(amount: f64) -> OrderRequest {
        OrderRequest {
            market: "KRW-BTC".into(),
            position: OrderPosition::Bid,
            kind: OrderType::Market,
            size: OrderSize::Amount(amount),
            price: None,
            strategy_id: "s".into(),
            identifier: "entry-1".into(),
            client_tag: "t".into(),
        }
    }

    #[test]
    fn submit_reserves_and_records_pending_order() {
        let mut e = engine(false, 1_000_000.0);
        let order = e.submit(&bid_request(100_000.0)).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(e.account.get_budget("KRW-BTC").unwrap().reserved_krw, 100_000.0 * 1.001);
    }

    #[test]
    fn duplicate_bid_is_rejected_without_touching_the_api() {
        let mut e = engine(false, 1_000_000.0);
        e.submit(&bid_request(100_000.0)).unwrap();
        let err = e.submit(&bid_request(50_000.0)).unwrap_err();
        assert!(matches!(err, EngineError::OrderRejected(_)));
    }

    #[test]
    fn transport_failure_rolls_back_reservation() {
        let mut e = engine(true, 1_000_000.0);
        let err = e.submit(&bid_request(100_000.0)).unwrap_err();
        assert!(matches!(err, EngineError::InternalError(_)));
        let budget = e.account.get_budget("KRW-BTC").unwrap();
        assert_eq!(budget.available_krw, 1_000_000.0);
        assert_eq!(budget.reserved_krw, 0.0);
    }

    #[test]
    fn my_trade_dedupes_by_trade_id() {
        let mut e = engine(false, 1_000_000.0);
        e.submit(&bid_request(100_000.0)).unwrap();
        let trade = MyTrade {
            order_id: "U1".into(),
            trade_id: "T1".into(),
            market: "KRW-BTC".into(),
            side: OrderPosition::Bid,
            price: 50_000_000.0,
            volume: 0.002,
            executed_funds: 100_000.0,
            fee: 50.0,
            is_maker: None,
            trade_timestamp_ms: 0,
            identifier: Some("entry-1".into()),
        };
        e.on_my_trade(&trade);
        e.on_my_trade(&trade);
        let events = e.poll_events();
        assert_eq!(events.len(), 1);
    }
}
