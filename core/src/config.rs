//! Explicit configuration structs threaded through constructors.
//!
//! Per the design notes, there is no global configuration singleton: every tunable named in
//! the external-interfaces section gets an explicit field here, with the documented default,
//! deserializable from whatever configuration source the embedding binary chooses.

use serde::{Deserialize, Serialize};

/// Strategy-level tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Minimum order notional, in quote currency. Also used as the position-significance
    /// threshold for strategy self-heal.
    pub min_notional_krw: f64,
    /// Subtracted from sell volume to avoid oversell due to floating point drift.
    pub volume_safety_eps: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_notional_krw: 5_000.0,
            volume_safety_eps: 1e-7,
        }
    }
}

/// `MarketEngine` tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dedupe FIFO cap for seen trade ids.
    pub max_seen_trades: usize,
    /// Safety multiplier applied to BUY reservations to cover fees.
    pub reserve_margin: f64,
    /// Fallback fee rate applied if the exchange does not report one.
    pub default_trade_fee_rate: f64,
    /// Run `OrderStore::cleanup` every this many terminal transitions.
    pub cleanup_every: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_seen_trades: 20_000,
            reserve_margin: 1.001,
            default_trade_fee_rate: 0.0005,
            cleanup_every: 100,
        }
    }
}

/// `EventRouter` / event-bridge tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Market-data queue capacity (drop-oldest beyond this).
    pub max_backlog: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { max_backlog: 5_000 }
    }
}

/// `AccountManager` tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Coin balances below this are treated as zero.
    pub coin_epsilon: f64,
    /// Reserved-KRW amounts below this are swept into available on `finalize_order`.
    pub krw_dust_threshold: f64,
    /// Position value (in KRW) below this is treated as dust at construction/sync time.
    pub init_dust_threshold_krw: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            coin_epsilon: 1e-7,
            krw_dust_threshold: 10.0,
            init_dust_threshold_krw: 5_000.0,
        }
    }
}

/// `MarketEngineManager` tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketManagerConfig {
    /// Per-market event queue capacity (drop-oldest for market data).
    pub queue_capacity: usize,
    /// Retry count for the initial/post-recovery account sync.
    pub sync_retry: u32,
}

impl Default for MarketManagerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5_000,
            sync_retry: 3,
        }
    }
}

/// `StartupRecovery` tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub cancel_retry: u32,
    pub verify_retry: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            cancel_retry: 3,
            verify_retry: 3,
        }
    }
}
