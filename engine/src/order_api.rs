//! `OrderApi`: the exchange-facing contract the engine consumes, and `SharedOrderApi`, a
//! facade that serializes concurrent callers onto it.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tradebot_core::{Account, Order, OrderId, OrderRequest, RestError};

/// The four REST operations the engine needs from the exchange. No wire format is fixed
/// here — an external collaborator implements this against whatever signing/transport it
/// uses.
pub trait OrderApi: Send {
    fn get_my_account(&mut self) -> Result<Account, RestError>;
    fn get_open_orders(&mut self, market: &str) -> Result<Vec<Order>, RestError>;
    fn cancel_order(&mut self, order_id: Option<&str>, identifier: Option<&str>) -> Result<bool, RestError>;
    fn post_order(&mut self, request: &OrderRequest) -> Result<OrderId, RestError>;
}

/// Serializes every call onto a single underlying [`OrderApi`] so at most one REST
/// round-trip is in flight at a time, regardless of how many market worker threads call in.
///
/// Meant to be shared behind an `Arc`: one instance, many handles, never cloned or moved
/// once constructed.
pub struct SharedOrderApi {
    client: Mutex<Box<dyn OrderApi>>,
    in_flight: AtomicUsize,
}

impl std::fmt::Debug for SharedOrderApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedOrderApi")
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish()
    }
}

impl SharedOrderApi {
    pub fn new(client: Box<dyn OrderApi>) -> Self {
        Self {
            client: Mutex::new(client),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Current in-flight call count. Observable by tests to assert the at-most-one
    /// invariant; always 0 or 1 by construction since `call` holds the mutex for the
    /// duration of the underlying call.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn get_my_account(&self) -> Result<Account, RestError> {
        self.call(|c| c.get_my_account())
    }

    pub fn get_open_orders(&self, market: &str) -> Result<Vec<Order>, RestError> {
        self.call(|c| c.get_open_orders(market))
    }

    pub fn cancel_order(&self, order_id: Option<&str>, identifier: Option<&str>) -> Result<bool, RestError> {
        self.call(|c| c.cancel_order(order_id, identifier))
    }

    pub fn post_order(&self, request: &OrderRequest) -> Result<OrderId, RestError> {
        self.call(|c| c.post_order(request))
    }

    fn call<T>(&self, f: impl FnOnce(&mut dyn OrderApi) -> Result<T, RestError>) -> Result<T, RestError> {
        let mut guard = self.client.lock();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = f(&mut **guard);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tradebot_core::{OrderPosition, OrderSize, OrderType};

    struct StubApi;
    impl OrderApi for StubApi {
        fn get_my_account(&mut self) -> Result<Account, RestError> {
            Ok(Account {
                id: "a".into(),
                positions: vec![],
            })
        }
        fn get_open_orders(&mut self, _market: &str) -> Result<Vec<Order>, RestError> {
            Ok(vec![])
        }
        fn cancel_order(&mut self, _order_id: Option<&str>, _identifier: Option<&str>) -> Result<bool, RestError> {
            Ok(true)
        }
        fn post_order(&mut self, _request: &OrderRequest) -> Result<OrderId, RestError> {
            Ok("U1".into())
        }
    }

    #[test]
    fn at_most_one_call_in_flight_under_concurrent_callers() {
        let api = Arc::new(SharedOrderApi::new(Box::new(StubApi)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let api = Arc::clone(&api);
                thread::spawn(move || {
                    let req = OrderRequest {
                        market: "KRW-BTC".into(),
                        position: OrderPosition::Bid,
                        kind: OrderType::Market,
                        size: OrderSize::Amount(1000.0),
                        price: None,
                        strategy_id: "s".into(),
                        identifier: "id".into(),
                        client_tag: "t".into(),
                    };
                    api.post_order(&req).unwrap();
                    assert!(api.in_flight() <= 1);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(api.in_flight(), 0);
    }
}
