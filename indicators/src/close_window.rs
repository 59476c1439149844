//! Rolling close-price window, used to derive trend strength (`|close - closeN| / closeN`).

use tradebot_core::Price;

use crate::ring_buffer::RingBuffer;
use crate::value::Value;

/// Stores the last `n + 1` closes so `close_n()` can return the close from `n` bars ago
/// once that many samples have been seen.
#[derive(Debug, Clone)]
pub struct ClosePriceWindow {
    buffer: RingBuffer<Price>,
    n: usize,
}

impl ClosePriceWindow {
    pub fn new(n: usize) -> Self {
        Self {
            buffer: RingBuffer::new(n + 1),
            n,
        }
    }

    /// Feeds one new close price, returning `close[n bars ago]` once ready.
    pub fn update(&mut self, close: Price) -> Value<Price> {
        self.buffer.push(close);
        if self.buffer.has_enough(self.n + 1) {
            Value::ready(*self.buffer.oldest().expect("has_enough guarantees an element"))
        } else {
            Value::not_ready(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_close_n_bars_back_once_ready() {
        let mut w = ClosePriceWindow::new(3);
        for c in [1.0, 2.0, 3.0] {
            assert!(!w.update(c).ready);
        }
        let v = w.update(4.0);
        assert!(v.ready);
        assert_eq!(v.value, 1.0);

        let v = w.update(5.0);
        assert!(v.ready);
        assert_eq!(v.value, 2.0);
    }

    #[test]
    fn zero_lookback_returns_current_close() {
        let mut w = ClosePriceWindow::new(0);
        let v = w.update(42.0);
        assert!(v.ready);
        assert_eq!(v.value, 42.0);
    }
}
