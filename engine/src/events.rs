//! Neutral events the engine emits upward to the strategy, translated 1:1 into
//! `FillEvent`/`OrderStatusEvent` at the worker boundary.

use tradebot_core::{Identifier, OrderId, OrderPosition, OrderStatus, Price, TradeId, Volume};

/// A single fill observed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineFillEvent {
    pub identifier: Identifier,
    pub order_id: OrderId,
    pub trade_id: TradeId,
    pub position: OrderPosition,
    pub fill_price: Price,
    pub filled_volume: Volume,
}

/// A terminal order-status transition observed by the engine. Only emitted for transitions
/// into `Filled`/`Canceled`/`Rejected` — intermediate statuses never produce one.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOrderStatusEvent {
    pub identifier: Identifier,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub position: OrderPosition,
    pub executed_volume: Volume,
    pub remaining_volume: Volume,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Fill(EngineFillEvent),
    Status(EngineOrderStatusEvent),
}
