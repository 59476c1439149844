//! Neutral types at the strategy boundary: account/position snapshots, the mechanical
//! translation of engine events, and the order intent a strategy hands back to its worker.

use tradebot_core::{
    Amount, Identifier, OrderId, OrderPosition, OrderRequest, OrderStatus, Price, TradeId, Volume,
};

/// Per-market balance view a strategy reasons about. Built by the worker from the account
/// ledger before each `onCandle` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountSnapshot {
    pub krw_available: Amount,
    pub coin_available: Volume,
}

impl AccountSnapshot {
    pub fn can_buy(&self) -> bool {
        self.krw_available > 0.0
    }
}

/// Reconciled position, built by `StartupRecovery` and handed to `syncOnStart`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSnapshot {
    pub coin: Volume,
    pub avg_entry_price: Price,
}

/// Mechanical translation of `EngineFillEvent`.
#[derive(Debug, Clone, PartialEq)]
pub struct FillEvent {
    pub identifier: Identifier,
    pub order_id: OrderId,
    pub trade_id: TradeId,
    pub position: OrderPosition,
    pub fill_price: Price,
    pub filled_volume: Volume,
}

/// Mechanical translation of `EngineOrderStatusEvent`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusEvent {
    pub identifier: Identifier,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub position: OrderPosition,
    pub executed_volume: Volume,
    pub remaining_volume: Volume,
}

/// What a strategy wants to do in response to a candle. `order = None` means "do nothing".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decision {
    pub order: Option<OrderRequest>,
}
