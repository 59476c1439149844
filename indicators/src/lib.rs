#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]

//! Rolling-window indicators used by the mean-reversion strategy: a Wilder RSI, a rolling
//! close-price window, and a rolling-return volatility estimate. All single-threaded — each
//! instance is owned by the strategy that owns it, which is in turn owned by one worker
//! thread.

pub mod close_window;
pub mod ring_buffer;
pub mod rsi;
pub mod value;
pub mod volatility;

pub use close_window::ClosePriceWindow;
pub use ring_buffer::RingBuffer;
pub use rsi::RsiWilder;
pub use value::Value;
pub use volatility::ChangeVolatilityIndicator;
