//! Shared domain types: identifiers, money, orders, candles, trades and account snapshots.
//!
//! These types are produced and consumed by every other crate in the workspace. None of them
//! carry exchange-specific wire formats — that mapping is an external collaborator's job.

use serde::{Deserialize, Serialize};

/// Price in quote currency. Treated as a finite double; comparisons use explicit tolerance
/// where noted in the owning component.
pub type Price = f64;

/// Volume in base currency.
pub type Volume = f64;

/// Amount (notional) in quote currency, i.e. `Price * Volume`.
pub type Amount = f64;

/// Opaque market code of the form `QUOTE-BASE`, e.g. `"KRW-BTC"`.
pub type Market = String;

/// Exchange-assigned unique order id.
pub type OrderId = String;

/// Strategy-assigned client order id, stable across restarts.
pub type Identifier = String;

/// Unique-per-fill id, assigned by the exchange or fabricated by the engine.
pub type TradeId = String;

/// Splits `"KRW-BTC"` into `("BTC", "KRW")` on the first `-`.
///
/// Returns `None` if there is no separator.
pub fn split_market(market: &str) -> Option<(&str, &str)> {
    let idx = market.find('-')?;
    let quote = &market[..idx];
    let base = &market[idx + 1..];
    Some((base, quote))
}

/// Base currency of a market code, e.g. `base_of("KRW-BTC") == Some("BTC")`.
pub fn base_of(market: &str) -> Option<&str> {
    split_market(market).map(|(base, _)| base)
}

/// Quote currency of a market code, e.g. `quote_of("KRW-BTC") == Some("KRW")`.
pub fn quote_of(market: &str) -> Option<&str> {
    split_market(market).map(|(_, quote)| quote)
}

/// Buy / sell direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderPosition {
    Bid,
    Ask,
}

/// Market or limit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// Lifecycle status of an order. `Filled`/`Canceled`/`Rejected` are terminal and sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Open,
    Pending,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    /// Non-terminal: the order may still receive fills or status changes.
    pub fn is_open(self) -> bool {
        matches!(self, Self::New | Self::Open | Self::Pending)
    }

    /// Terminal: `Filled`, `Canceled` or `Rejected`. Once true, always true for this order.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "New",
            Self::Open => "Open",
            Self::Pending => "Pending",
            Self::Filled => "Filled",
            Self::Canceled => "Canceled",
            Self::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}

/// Order size expressed either as a base-currency volume or a quote-currency amount.
///
/// By convention: `Limit` orders and `ASK Market` orders use `Volume`; `BID Market` orders
/// use `Amount`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderSize {
    Volume(Volume),
    Amount(Amount),
}

/// A strategy's order intent, handed to `MarketEngine::submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market: Market,
    pub position: OrderPosition,
    pub kind: OrderType,
    pub size: OrderSize,
    /// Only meaningful for `Limit` orders.
    pub price: Option<Price>,
    pub strategy_id: String,
    pub identifier: Identifier,
    pub client_tag: String,
}

/// Engine-tracked order lifecycle record. `OrderStore` holds these keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub market: Market,
    pub identifier: Option<Identifier>,

    pub id: OrderId,
    pub position: OrderPosition,
    pub kind: OrderType,

    pub price: Option<Price>,
    pub volume: Option<Volume>,

    pub executed_volume: Volume,
    pub remaining_volume: Volume,
    pub trades_count: u32,

    pub reserved_fee: Amount,
    pub paid_fee: Amount,
    pub remaining_fee: Amount,
    pub locked: Amount,

    pub executed_funds: Amount,

    pub status: OrderStatus,
    pub created_at: String,
}

impl Order {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }
}

/// One candle bar, tagged with the market and bar start so the strategy can dedupe and
/// detect bar boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub market: Market,
    pub open_price: Price,
    pub high_price: Price,
    pub low_price: Price,
    pub close_price: Price,
    pub volume: Volume,
    /// Opaque bar-start marker (exchange timestamp string). Two candles with the same
    /// `(market, start_timestamp)` refer to the same bar.
    pub start_timestamp: String,
}

impl Candle {
    pub fn new(
        market: impl Into<Market>,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Volume,
        start_timestamp: impl Into<String>,
    ) -> Self {
        Self {
            market: market.into(),
            open_price: open,
            high_price: high,
            low_price: low,
            close_price: close,
            volume,
            start_timestamp: start_timestamp.into(),
        }
    }
}

/// A single private fill, emitted by the exchange's private stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyTrade {
    pub order_id: OrderId,
    pub trade_id: TradeId,
    pub market: Market,
    pub side: OrderPosition,
    pub price: Price,
    pub volume: Volume,
    pub executed_funds: Amount,
    pub fee: Amount,
    pub is_maker: Option<bool>,
    pub trade_timestamp_ms: i64,
    pub identifier: Option<Identifier>,
}

/// One held position as reported by the exchange account snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Currency held, e.g. `"BTC"`.
    pub currency: String,
    /// Free (unlocked) balance.
    pub free: f64,
    /// Average buy price, denominated in `unit_currency`.
    pub avg_buy_price: Price,
    /// Currency the average price is denominated in, e.g. `"KRW"`.
    pub unit_currency: String,
}

/// Full exchange account snapshot, as returned by `OrderApi::get_my_account`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub positions: Vec<Position>,
}
