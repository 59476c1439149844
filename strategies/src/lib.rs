#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]

//! Per-market strategy state machines. Currently one strategy ships: an RSI mean-reversion
//! policy driven by candles and fed back engine events.

pub mod rsi_mean_reversion;
pub mod types;

pub use rsi_mean_reversion::{bot_prefix, RsiMeanReversionStrategy, StrategyParams, StrategyState};
pub use types::{AccountSnapshot, Decision, FillEvent, OrderStatusEvent, PositionSnapshot};
