#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]

//! Wires the engine and strategy crates into a running multi-market trading process: the
//! event router, per-market worker threads, and startup recovery.

pub mod manager;
pub mod mapper;
pub mod queues;
pub mod recovery;
pub mod router;

pub use manager::MarketEngineManager;
pub use mapper::MessageMapper;
pub use queues::{private_order_channel, MarketDataQueue, PrivateOrderQueue};
pub use recovery::StartupRecovery;
pub use router::{EventRouter, RouterStats, RouterStatsSnapshot};
