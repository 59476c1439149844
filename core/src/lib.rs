#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]
#![allow(clippy::too_many_arguments)]

//! Domain types, error hierarchy, logging and configuration for the trading runtime.
//!
//! This crate has no opinions about exchanges, transports or wire formats — it is the
//! shared vocabulary that `tradebot-account`, `tradebot-indicators`, `tradebot-strategies`,
//! `tradebot-engine` and `tradebot-trader` build on.

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use domain::*;
pub use error::{AccountError, BotError, EngineError, RestError, RouterError, RxDropped};
