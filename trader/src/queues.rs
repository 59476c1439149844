//! Per-market feed queues. Market data uses a bounded, drop-oldest buffer (stale ticks are
//! worthless); private order events use an unbounded `mpsc` channel (losing a fill is not an
//! option).

use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Bounded FIFO of raw market-data payloads. Pushing past `capacity` drops the oldest entry.
pub struct MarketDataQueue {
    capacity: usize,
    items: Mutex<VecDeque<String>>,
    not_empty: Condvar,
}

impl std::fmt::Debug for MarketDataQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl MarketDataQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    pub fn push(&self, message: String) {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            items.pop_front();
        }
        items.push_back(message);
        self.not_empty.notify_one();
    }

    /// Waits up to `timeout` for an item, returning `None` if none arrives.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        let mut items = self.items.lock();
        if items.is_empty() {
            self.not_empty.wait_for(&mut items, timeout);
        }
        items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded private-order queue. The sending half is handed to the router; the receiving
/// half is owned exclusively by the market's worker thread.
pub struct PrivateOrderQueue {
    receiver: mpsc::Receiver<String>,
}

impl std::fmt::Debug for PrivateOrderQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateOrderQueue").finish_non_exhaustive()
    }
}

impl PrivateOrderQueue {
    pub fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

/// Builds a connected sender/receiver pair for one market's private-order queue.
pub fn private_order_channel() -> (mpsc::Sender<String>, PrivateOrderQueue) {
    let (tx, rx) = mpsc::channel();
    (tx, PrivateOrderQueue { receiver: rx })
}
