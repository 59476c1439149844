//! Seam between wire payloads and domain types. JSON shape and DTO field names are an external
//! concern; the worker loop only needs `Order`/`MyTrade`/`Candle` out the other end.

use tradebot_core::{BotError, Candle, MyTrade, Order};

/// Translates raw feed text into domain values. Implementations own the DTO definitions and
/// the exchange-specific field mapping; callers never see the intermediate shape.
pub trait MessageMapper: Send + Sync {
    /// Parses a private-order message into the order it describes, plus the trade it carries
    /// if the message represents an execution rather than a bare status change.
    fn map_my_order(&self, raw: &str) -> Result<(Order, Option<MyTrade>), BotError>;

    /// Parses a market-data message into a candle, or `None` if the message is not a candle
    /// update (e.g. an orderbook snapshot on the same stream).
    fn map_market_data(&self, raw: &str) -> Result<Option<Candle>, BotError>;
}
