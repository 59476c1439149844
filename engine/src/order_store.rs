//! `OrderStore`: keyed registry of active and recently-terminated orders.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use tradebot_core::{Order, OrderId};

struct State {
    orders: HashMap<OrderId, Order>,
    completed_ids: VecDeque<OrderId>,
}

/// Shared, concurrent order registry. Readers (`get`/`size`/`get_open_orders_by_market`)
/// take a shared lock; writers (`add`/`update`/`erase`/`upsert`) take an exclusive lock, so a
/// single terminal transition is enqueued into the completed-order FIFO exactly once even
/// when `upsert` races across threads.
pub struct OrderStore {
    max_completed_orders: usize,
    state: RwLock<State>,
}

impl std::fmt::Debug for OrderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStore")
            .field("size", &self.size())
            .finish()
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl OrderStore {
    pub fn new(max_completed_orders: usize) -> Self {
        Self {
            max_completed_orders,
            state: RwLock::new(State {
                orders: HashMap::new(),
                completed_ids: VecDeque::new(),
            }),
        }
    }

    /// Inserts a new order. Returns `false` if `id` is empty or already present.
    pub fn add(&self, order: Order) -> bool {
        if order.id.is_empty() {
            return false;
        }
        let mut state = self.state.write();
        if state.orders.contains_key(&order.id) {
            return false;
        }
        state.orders.insert(order.id.clone(), order);
        true
    }

    /// Returns a snapshot copy of the order, if present.
    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.state.read().orders.get(order_id).cloned()
    }

    /// Replaces an existing order wholesale. Returns `false` if absent.
    pub fn update(&self, order: Order) -> bool {
        let mut state = self.state.write();
        let Some(slot) = state.orders.get_mut(&order.id) else {
            return false;
        };
        let old_status = slot.status;
        *slot = order;
        let new_status = slot.status;
        Self::record_transition(&mut state, old_status.is_open() && !new_status.is_open(), slot.id.clone());
        true
    }

    /// Inserts or replaces. Idempotent, used by the realtime path where duplicate
    /// deliveries are expected.
    pub fn upsert(&self, order: Order) {
        if order.id.is_empty() {
            return;
        }
        let mut state = self.state.write();
        let old_status = state.orders.get(&order.id).map(|o| o.status);
        let transitioned = match old_status {
            Some(old) => old.is_open() && !order.status.is_open(),
            None => false,
        };
        let id = order.id.clone();
        state.orders.insert(id.clone(), order);
        Self::record_transition(&mut state, transitioned, id);
    }

    fn record_transition(state: &mut State, transitioned: bool, id: OrderId) {
        if transitioned {
            state.completed_ids.push_back(id);
        }
    }

    /// Removes an order outright (distinct from a terminal status transition).
    pub fn erase(&self, order_id: &str) -> bool {
        self.state.write().orders.remove(order_id).is_some()
    }

    /// All non-terminal orders for `market`.
    pub fn get_open_orders_by_market(&self, market: &str) -> Vec<Order> {
        self.state
            .read()
            .orders
            .values()
            .filter(|o| o.market == market && o.is_open())
            .cloned()
            .collect()
    }

    pub fn size(&self) -> usize {
        self.state.read().orders.len()
    }

    /// Drops the oldest terminal orders until the completed FIFO is within
    /// `max_completed_orders`. Returns how many were actually removed.
    pub fn cleanup(&self) -> usize {
        let mut state = self.state.write();
        let mut removed = 0;
        while state.completed_ids.len() > self.max_completed_orders {
            let Some(oldest_id) = state.completed_ids.pop_front() else {
                break;
            };
            if let Some(order) = state.orders.get(&oldest_id) {
                if !order.is_open() {
                    state.orders.remove(&oldest_id);
                    removed += 1;
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradebot_core::{OrderPosition, OrderStatus, OrderType};

    fn order(id: &str, market: &str, status: OrderStatus) -> Order {
        Order {
            market: market.into(),
            identifier: None,
            id: id.into(),
            position: OrderPosition::Bid,
            kind: OrderType::Market,
            price: None,
            volume: None,
            executed_volume: 0.0,
            remaining_volume: 0.0,
            trades_count: 0,
            reserved_fee: 0.0,
            paid_fee: 0.0,
            remaining_fee: 0.0,
            locked: 0.0,
            executed_funds: 0.0,
            status,
            created_at: "t".into(),
        }
    }

    #[test]
    fn add_rejects_empty_and_duplicate_ids() {
        let store = OrderStore::default();
        assert!(!store.add(order("", "KRW-BTC", OrderStatus::New)));
        assert!(store.add(order("U1", "KRW-BTC", OrderStatus::New)));
        assert!(!store.add(order("U1", "KRW-BTC", OrderStatus::New)));
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = OrderStore::default();
        let o = order("U1", "KRW-BTC", OrderStatus::Pending);
        store.upsert(o.clone());
        assert_eq!(store.get("U1"), Some(o));
    }

    #[test]
    fn terminal_transition_is_recorded_once_under_repeated_upsert() {
        let store = OrderStore::new(0);
        store.upsert(order("U1", "KRW-BTC", OrderStatus::New));
        store.upsert(order("U1", "KRW-BTC", OrderStatus::Filled));
        store.upsert(order("U1", "KRW-BTC", OrderStatus::Filled));
        assert_eq!(store.cleanup(), 1);
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn open_orders_filtered_by_market_and_status() {
        let store = OrderStore::default();
        store.add(order("U1", "KRW-BTC", OrderStatus::Open));
        store.add(order("U2", "KRW-BTC", OrderStatus::Filled));
        store.add(order("U3", "KRW-ETH", OrderStatus::Open));
        let open = store.get_open_orders_by_market("KRW-BTC");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "U1");
    }
}
