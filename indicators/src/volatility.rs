//! Rolling-return volatility: population standard deviation of `(close - prev) / prev`.

use tradebot_core::Price;

use crate::ring_buffer::RingBuffer;
use crate::value::Value;

/// Maintains `sum`/`sumsq` of the last `window` returns in O(1) per update via the ring
/// buffer's push-returns-evicted pattern.
#[derive(Debug, Clone)]
pub struct ChangeVolatilityIndicator {
    window: usize,
    prev: Option<Price>,
    returns: RingBuffer<f64>,
    sum: f64,
    sumsq: f64,
}

impl ChangeVolatilityIndicator {
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            prev: None,
            returns: RingBuffer::new(window),
            sum: 0.0,
            sumsq: 0.0,
        }
    }

    /// Feeds one new close price, returning the current volatility reading.
    ///
    /// The first sample, and any sample immediately following a zero close, contributes no
    /// return (there is nothing to divide by).
    pub fn update(&mut self, close: Price) -> Value<f64> {
        if let Some(prev) = self.prev {
            if prev != 0.0 {
                let r = (close - prev) / prev;
                if let Some(evicted) = self.returns.push(r) {
                    self.sum -= evicted;
                    self.sumsq -= evicted * evicted;
                }
                self.sum += r;
                self.sumsq += r * r;
            }
        }
        self.prev = Some(close);

        if self.returns.has_enough(self.window) {
            let n = self.window as f64;
            let mean = self.sum / n;
            let variance = (self.sumsq / n - mean * mean).max(0.0);
            Value::ready(variance.sqrt())
        } else {
            Value::not_ready(0.0)
        }
    }
}
