//! Wilder-smoothed RSI.

use tradebot_core::Price;

use crate::value::Value;

/// Relative Strength Index with Wilder smoothing.
///
/// Seeds `avg_gain`/`avg_loss` as the plain mean of the first `length` deltas, then applies
/// Wilder's recurrence (`avg = (avg * (length - 1) + sample) / length`) to every delta after
/// that.
#[derive(Debug, Clone)]
pub struct RsiWilder {
    length: usize,
    prev: Option<Price>,
    seed_gain_sum: f64,
    seed_loss_sum: f64,
    seed_count: usize,
    avg_gain: f64,
    avg_loss: f64,
    ready: bool,
    value: f64,
}

impl RsiWilder {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
            prev: None,
            seed_gain_sum: 0.0,
            seed_loss_sum: 0.0,
            seed_count: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
            ready: false,
            value: 0.0,
        }
    }

    /// Feeds one new close price, returning the current RSI reading.
    pub fn update(&mut self, close: Price) -> Value<f64> {
        if let Some(prev) = self.prev {
            let delta = close - prev;
            let gain = delta.max(0.0);
            let loss = (-delta).max(0.0);

            if !self.ready {
                self.seed_gain_sum += gain;
                self.seed_loss_sum += loss;
                self.seed_count += 1;
                if self.seed_count >= self.length {
                    let l = self.length as f64;
                    self.avg_gain = self.seed_gain_sum / l;
                    self.avg_loss = self.seed_loss_sum / l;
                    self.ready = true;
                    self.value = Self::compute_rsi(self.avg_gain, self.avg_loss);
                }
            } else {
                let l = self.length as f64;
                self.avg_gain = (self.avg_gain * (l - 1.0) + gain) / l;
                self.avg_loss = (self.avg_loss * (l - 1.0) + loss) / l;
                self.value = Self::compute_rsi(self.avg_gain, self.avg_loss);
            }
        }
        self.prev = Some(close);

        if self.ready {
            Value::ready(self.value)
        } else {
            Value::not_ready(self.value)
        }
    }

    fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_gain == 0.0 && avg_loss == 0.0 {
            50.0
        } else if avg_loss == 0.0 {
            100.0
        } else if avg_gain == 0.0 {
            0.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_until_length_deltas_seen() {
        let mut rsi = RsiWilder::new(3);
        assert!(!rsi.update(100.0).ready);
        assert!(!rsi.update(101.0).ready);
        assert!(!rsi.update(102.0).ready);
        assert!(rsi.update(103.0).ready);
    }

    #[test]
    fn all_gains_saturate_at_100() {
        let mut rsi = RsiWilder::new(2);
        rsi.update(100.0);
        rsi.update(101.0);
        let v = rsi.update(102.0);
        assert!(v.ready);
        assert!((v.value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn all_losses_saturate_at_0() {
        let mut rsi = RsiWilder::new(2);
        rsi.update(100.0);
        rsi.update(99.0);
        let v = rsi.update(98.0);
        assert!(v.ready);
        assert!(v.value.abs() < 1e-9);
    }

    #[test]
    fn flat_prices_yield_50() {
        let mut rsi = RsiWilder::new(2);
        rsi.update(100.0);
        rsi.update(100.0);
        let v = rsi.update(100.0);
        assert!(v.ready);
        assert!((v.value - 50.0).abs() < 1e-9);
    }
}
