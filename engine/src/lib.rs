#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]

//! Order storage, the shared REST facade, and the per-market order-lifecycle engine.

pub mod events;
pub mod market_engine;
pub mod order_api;
pub mod order_store;

pub use events::{EngineEvent, EngineFillEvent, EngineOrderStatusEvent};
pub use market_engine::MarketEngine;
pub use order_api::{OrderApi, SharedOrderApi};
pub use order_store::OrderStore;
